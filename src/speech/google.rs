use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde_json::json;

use super::{Speed, SpeechSynthesizer, VoiceProfile};

const RPC_ID: &str = "jQ1olc";
const MAX_CHUNK_CHARS: usize = 100;
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/47.0.2526.106 Safari/537.36";

/// Speech from the Google Translate web endpoint. Returns MP3.
pub struct GoogleTranslateTts {
    client: reqwest::Client,
    endpoint: String,
    audio_pattern: Regex,
}

impl GoogleTranslateTts {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            audio_pattern: Regex::new(r#"jQ1olc","\[\\"(.*)\\"\]"#)
                .context("Failed to compile audio pattern")?,
        })
    }

    fn url(&self, voice: &VoiceProfile) -> String {
        self.endpoint.replace("{tld}", &voice.tld)
    }

    async fn synthesize_chunk(&self, chunk: &str, voice: &VoiceProfile) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(self.url(voice))
            .header("Referer", "http://translate.google.com/")
            .header("User-Agent", USER_AGENT)
            .form(&[("f.req", rpc_payload(chunk, voice)?)])
            .send()
            .await
            .context("Failed to send request to the speech service")?
            .error_for_status()
            .context("Speech service error")?;

        let body = response
            .text()
            .await
            .context("Failed to read speech service response")?;

        self.decode_audio(&body)
    }

    fn decode_audio(&self, body: &str) -> Result<Vec<u8>> {
        let mut audio = Vec::new();
        for line in body.lines().filter(|line| line.contains(RPC_ID)) {
            if let Some(captures) = self.audio_pattern.captures(line) {
                let encoded = &captures[1];
                audio.extend(
                    STANDARD
                        .decode(encoded)
                        .context("Speech service returned malformed base64 audio")?,
                );
            }
        }

        if audio.is_empty() {
            bail!("Speech service response contained no audio");
        }

        Ok(audio)
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateTts {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>> {
        let mut audio = Vec::new();
        for chunk in split_text(text, MAX_CHUNK_CHARS) {
            tracing::debug!(
                speaker = %voice.speaker,
                chars = chunk.chars().count(),
                "Synthesizing chunk"
            );
            // MP3 frames concatenate into a valid stream.
            audio.extend(self.synthesize_chunk(&chunk, voice).await?);
        }
        Ok(audio)
    }
}

fn rpc_payload(text: &str, voice: &VoiceProfile) -> Result<String> {
    let speed = match voice.speed {
        Speed::Slow => json!(true),
        Speed::Normal => json!(null),
    };
    let parameter = serde_json::to_string(&json!([text, voice.lang, speed, "null"]))?;
    Ok(serde_json::to_string(&json!([[[
        RPC_ID, parameter, null, "generic"
    ]]]))?)
}

/// Splits `text` on whitespace into chunks of at most `max_chars` characters.
/// Words longer than the limit are cut.
fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word = word;
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let split_at = word
                .char_indices()
                .nth(max_chars)
                .map_or(word.len(), |(index, _)| index);
            chunks.push(word[..split_at].to_owned());
            word = &word[split_at..];
        }
        if word.is_empty() {
            continue;
        }

        let word_len = word.chars().count();
        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
