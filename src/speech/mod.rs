pub(crate) mod google;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Speed {
    #[default]
    Normal,
    Slow,
}

/// How one speaker sounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceProfile {
    pub speaker: String,
    pub lang: String,
    /// Top-level domain of the speech host, which selects the accent.
    pub tld: String,
    #[serde(default)]
    pub speed: Speed,
}

/// Ordered speaker-to-voice lookup table.
#[derive(Debug, Clone)]
pub struct VoiceTable {
    profiles: Vec<VoiceProfile>,
}

impl VoiceTable {
    pub fn new(profiles: Vec<VoiceProfile>) -> Result<Self> {
        if profiles.is_empty() {
            bail!("At least one voice must be configured");
        }

        let mut seen = HashSet::new();
        for profile in &profiles {
            if profile.speaker.trim().is_empty() || profile.speaker.contains(':') {
                bail!("Invalid speaker name `{}`", profile.speaker);
            }
            if !seen.insert(profile.speaker.as_str()) {
                bail!("Speaker `{}` is configured more than once", profile.speaker);
            }
        }

        Ok(Self { profiles })
    }

    pub fn get(&self, speaker: &str) -> Option<&VoiceProfile> {
        self.profiles.iter().find(|profile| profile.speaker == speaker)
    }

    pub fn speakers(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|profile| profile.speaker.as_str())
    }

    /// Returns the profile whose `SPEAKER:` prefix starts `line`, with the
    /// remainder of the line.
    pub fn match_line<'a>(&self, line: &'a str) -> Option<(&VoiceProfile, &'a str)> {
        self.profiles.iter().find_map(|profile| {
            line.strip_prefix(profile.speaker.as_str())
                .and_then(|rest| rest.strip_prefix(':'))
                .map(|rest| (profile, rest))
        })
    }
}

/// Turns text into encoded audio in a given voice.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>>;
}

#[cfg(test)]
pub(crate) fn profile(speaker: &str, tld: &str) -> VoiceProfile {
    VoiceProfile {
        speaker: speaker.to_owned(),
        lang: "en".to_owned(),
        tld: tld.to_owned(),
        speed: Speed::Normal,
    }
}
