use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::dialogue::groq::GenerateError;
use crate::dialogue::{DialogueGenerator, JobLevel};
use crate::render::{RenderSummary, RenderTarget, render_dialogue};
use crate::resume::{self, ExtractError, ResumeKind};
use crate::speech::{SpeechSynthesizer, VoiceTable};

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Please upload a resume and enter the job role.")]
    MissingInput,

    #[error("Unsupported file format. Please upload a PDF or DOCX file.")]
    UnsupportedFormat,

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("Failed to render feedback audio: {0:#}")]
    Render(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct FeedbackRequest {
    pub resume: PathBuf,
    /// Name the user gave the file; its extension selects the parser.
    pub file_name: String,
    pub role: String,
    pub level: JobLevel,
}

#[derive(Debug, Clone)]
pub struct Feedback {
    pub dialogue: String,
    pub audio: RenderSummary,
    pub elapsed: Duration,
}

/// Resume in, spoken HR feedback out.
pub struct Pipeline {
    generator: Arc<dyn DialogueGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voices: VoiceTable,
    target: RenderTarget,
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn DialogueGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        voices: VoiceTable,
        target: RenderTarget,
    ) -> Self {
        Self {
            generator,
            synthesizer,
            voices,
            target,
            running: Mutex::new(()),
        }
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub async fn run(&self, request: &FeedbackRequest) -> Result<Feedback, FeedbackError> {
        let role = request.role.trim();
        if role.is_empty() {
            return Err(FeedbackError::MissingInput);
        }
        let kind =
            ResumeKind::from_file_name(&request.file_name).ok_or(FeedbackError::UnsupportedFormat)?;

        // Runs share the output file.
        let _running = self.running.lock().await;
        let started = Instant::now();

        let resume_text = resume::extract(&request.resume, kind).await?;
        let dialogue = self
            .generator
            .generate(&resume_text, role, request.level)
            .await?;
        let audio = render_dialogue(
            &dialogue,
            &self.voices,
            self.synthesizer.as_ref(),
            &self.target,
        )
        .await
        .map_err(FeedbackError::Render)?;

        let elapsed = started.elapsed();
        tracing::info!(
            seconds = elapsed.as_secs_f64(),
            segments = audio.segments,
            "Feedback generated successfully"
        );

        Ok(Feedback {
            dialogue,
            audio,
            elapsed,
        })
    }
}
