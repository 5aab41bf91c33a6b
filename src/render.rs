use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::{AudioBuffer, OutputFormat};
use crate::dialogue::Dialogue;
use crate::speech::{SpeechSynthesizer, VoiceTable};

/// Where and how the combined audio is written.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub output: PathBuf,
    pub format: OutputFormat,
    pub bitrate_kbps: u32,
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    pub segments: usize,
    pub duration: Duration,
    pub output: PathBuf,
}

/// Speaks every recognised line of `dialogue_text` in its speaker's voice and
/// writes the lines, in order, to one audio file.
pub async fn render_dialogue(
    dialogue_text: &str,
    voices: &VoiceTable,
    synthesizer: &dyn SpeechSynthesizer,
    target: &RenderTarget,
) -> Result<RenderSummary> {
    let dialogue = Dialogue::parse(dialogue_text, voices);
    let total_lines = dialogue.lines.len();
    let mut combined = AudioBuffer::empty();

    if dialogue.is_empty() {
        tracing::warn!("Dialogue has no recognised speaker lines");
    }
    tracing::info!(lines = total_lines, "Generating audio…");

    for (index, line) in dialogue.lines.iter().enumerate() {
        let voice = voices.get(&line.speaker).ok_or_else(|| {
            anyhow!("No voice found for speaker '{}' in voice table", line.speaker)
        })?;

        tracing::debug!(
            "Generating audio for line {}/{total_lines} (voice: {})…",
            index + 1,
            voice.speaker
        );

        let audio = synthesizer
            .synthesize(&line.text, voice)
            .await
            .with_context(|| {
                format!("Failed to synthesize line {} ({})", index + 1, voice.speaker)
            })?;

        let segment = decode_via_temp_file(&audio, &voice.speaker, &target.scratch_dir)
            .await
            .with_context(|| format!("Failed to decode line {} ({})", index + 1, voice.speaker))?;
        combined.append(segment)?;
    }

    let duration = combined.duration();
    combined
        .write(&target.output, target.format, target.bitrate_kbps)
        .await?;

    let summary = RenderSummary {
        segments: total_lines,
        duration,
        output: target.output.clone(),
    };
    tracing::info!(
        segments = summary.segments,
        seconds = summary.duration.as_secs_f64(),
        output = %summary.output.display(),
        "Combined audio feedback saved"
    );

    Ok(summary)
}

/// The temporary file is removed when it goes out of scope, on success or error.
async fn decode_via_temp_file(
    audio: &[u8],
    speaker: &str,
    scratch_dir: &Path,
) -> Result<AudioBuffer> {
    tokio::fs::create_dir_all(scratch_dir)
        .await
        .context("Failed to create scratch directory")?;

    let temp = tempfile::Builder::new()
        .prefix(&format!("{}-", speaker.to_lowercase()))
        .suffix(".audio")
        .tempfile_in(scratch_dir)
        .context("Failed to create temporary audio file")?;

    tokio::fs::write(temp.path(), audio)
        .await
        .context("Failed to write temporary audio file")?;

    tokio::task::spawn_blocking(move || AudioBuffer::decode_file(temp.path()))
        .await
        .context("Audio decoder crashed")?
}
