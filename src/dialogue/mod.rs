pub(crate) mod groq;
pub(crate) mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::speech::VoiceTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum JobLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialogue {
    pub lines: Vec<DialogueLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: String,
    pub text: String,
}

impl Dialogue {
    /// Keeps lines that start with a known `SPEAKER:` prefix and have
    /// something to say. Everything else is dropped.
    pub fn parse(text: &str, voices: &VoiceTable) -> Self {
        Self {
            lines: text
                .lines()
                .filter_map(|line| voices.match_line(line))
                .map(|(voice, words)| (voice, words.trim()))
                .filter(|(_, words)| !words.is_empty())
                .map(|(voice, words)| DialogueLine {
                    speaker: voice.speaker.clone(),
                    text: words.to_owned(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Writes the HR panel's conversation about a resume.
#[async_trait]
pub trait DialogueGenerator: Send + Sync {
    async fn generate(
        &self,
        resume_text: &str,
        role: &str,
        level: JobLevel,
    ) -> Result<String, groq::GenerateError>;
}
