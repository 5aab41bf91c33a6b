use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::OutputFormat;
use crate::speech::{VoiceProfile, VoiceTable};

pub(crate) const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub generator: GeneratorConfig,
    pub speech: SpeechConfig,
    pub output: OutputConfig,
    voices: Vec<VoiceProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    /// Endpoint template; `{tld}` is replaced with the voice's top-level domain.
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_bitrate")]
    pub bitrate_kbps: u32,
    /// Where per-line temporary files go. Defaults to the system temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_bitrate() -> u32 {
    128
}

impl OutputConfig {
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    /// Loads the explicit config file if given, else the user's config file if
    /// one exists, else the built-in defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => user_config_path().filter(|path| path.is_file()),
        };

        match path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration");
                let contents = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&contents)
            }
            None => {
                tracing::info!("Using built-in configuration");
                Self::from_toml(DEFAULT_CONFIG)
            }
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config TOML")?;
        // Validate the voice table up front.
        config.voice_table()?;
        Ok(config)
    }

    pub fn voice_table(&self) -> Result<VoiceTable> {
        VoiceTable::new(self.voices.clone())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("config.toml"))
}
