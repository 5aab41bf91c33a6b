use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DialogueGenerator, JobLevel, prompt};
use crate::config::GeneratorConfig;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Failed to reach the language model: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Language model API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse language model stream: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Language model returned an empty conversation")]
    EmptyResponse,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
    stop: Option<&'a str>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client, Groq by default.
pub struct GroqClient {
    client: reqwest::Client,
    config: GeneratorConfig,
    api_key: String,
    speakers: Vec<String>,
}

impl GroqClient {
    pub fn new(config: GeneratorConfig, api_key: String, speakers: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            api_key,
            speakers,
        }
    }
}

#[async_trait]
impl DialogueGenerator for GroqClient {
    async fn generate(
        &self,
        resume_text: &str,
        role: &str,
        level: JobLevel,
    ) -> Result<String, GenerateError> {
        let speakers: Vec<&str> = self.speakers.iter().map(String::as_str).collect();
        let prompt = prompt::build(resume_text, role, level, &speakers);

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            stream: true,
            stop: None,
        };

        tracing::info!(model = %self.config.model, %role, %level, "Requesting HR conversation");

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut accumulator = StreamAccumulator::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if accumulator.feed(&chunk?)? {
                break;
            }
        }

        let conversation = accumulator.finish()?;
        if conversation.trim().is_empty() {
            return Err(GenerateError::EmptyResponse);
        }

        tracing::info!(chars = conversation.len(), "Received HR conversation");
        Ok(conversation)
    }
}

/// Collects `delta.content` fragments from a server-sent event stream.
#[derive(Default)]
struct StreamAccumulator {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl StreamAccumulator {
    /// Consumes raw bytes; returns `true` once the stream has signalled the end.
    fn feed(&mut self, bytes: &[u8]) -> Result<bool, GenerateError> {
        self.pending.extend_from_slice(bytes);

        while let Some(newline) = self.pending.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            self.process_line(&String::from_utf8_lossy(&line))?;
            if self.done {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn process_line(&mut self, line: &str) -> Result<(), GenerateError> {
        let Some(data) = line.trim().strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.done = true;
            return Ok(());
        }
        if data.is_empty() {
            return Ok(());
        }

        let chunk: ChatChunk = serde_json::from_str(data)?;
        if let Some(content) = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
        {
            self.text.push_str(&content);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<String, GenerateError> {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.process_line(&String::from_utf8_lossy(&rest))?;
        }
        Ok(self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    const PATH: &str = "/openai/v1/chat/completions";

    fn client(server: &MockServer) -> GroqClient {
        let config = GeneratorConfig {
            endpoint: server.url(PATH),
            model: "llama3-8b-8192".to_owned(),
            temperature: 1.0,
            max_tokens: 1024,
            top_p: 1.0,
        };
        GroqClient::new(config, "secret".to_owned(), vec!["HR1".into(), "HR2".into()])
    }

    fn event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"id": "x", "choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    #[test]
    fn concatenates_deltas_until_done() {
        let mut accumulator = StreamAccumulator::default();
        let body = format!(
            "{}{}data: {{\"choices\":[{{\"delta\":{{}}}}]}}\n\n{}data: [DONE]\n\n{}",
            event("HR1: Nice"),
            event(" resume.\nHR2: "),
            event("Agreed."),
            event("ignored after done"),
        );

        assert!(accumulator.feed(body.as_bytes()).unwrap());
        assert_eq!(accumulator.finish().unwrap(), "HR1: Nice resume.\nHR2: Agreed.");
    }

    #[test]
    fn tolerates_events_split_across_chunks() {
        let body = format!("{}{}data: [DONE]\n", event("Hello, "), event("world"));
        let mut accumulator = StreamAccumulator::default();

        let mut finished = false;
        for piece in body.as_bytes().chunks(7) {
            finished = accumulator.feed(piece).unwrap();
            if finished {
                break;
            }
        }

        assert!(finished);
        assert_eq!(accumulator.finish().unwrap(), "Hello, world");
    }

    #[test]
    fn multibyte_characters_survive_chunk_boundaries() {
        let body = event("Café résumé");
        let mut accumulator = StreamAccumulator::default();
        for piece in body.as_bytes().chunks(3) {
            accumulator.feed(piece).unwrap();
        }
        assert_eq!(accumulator.finish().unwrap(), "Café résumé");
    }

    #[test]
    fn final_line_without_newline_is_processed() {
        let body = event("tail");
        let mut accumulator = StreamAccumulator::default();
        assert!(!accumulator.feed(body.trim_end().as_bytes()).unwrap());
        assert_eq!(accumulator.finish().unwrap(), "tail");
    }

    #[test]
    fn comments_and_other_fields_are_ignored() {
        let mut accumulator = StreamAccumulator::default();
        accumulator
            .feed(b": keep-alive\nevent: message\nid: 3\n")
            .unwrap();
        assert_eq!(accumulator.finish().unwrap(), "");
    }

    #[test]
    fn malformed_event_is_a_parse_error() {
        let mut accumulator = StreamAccumulator::default();
        let error = accumulator.feed(b"data: {not json}\n").unwrap_err();
        assert!(matches!(error, GenerateError::Parse(_)));
    }

    #[tokio::test]
    async fn generate_streams_conversation_with_bearer_auth() {
        let server = MockServer::start_async().await;
        let body = format!(
            "{}{}data: [DONE]\n\n",
            event("HR1: Nice resume.\n"),
            event("HR2: Agreed.")
        );
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(PATH)
                    .header("authorization", "Bearer secret")
                    .json_body_partial(
                        r#"{"model": "llama3-8b-8192", "max_tokens": 1024, "stream": true}"#,
                    )
                    .body_contains("Backend Engineer");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(body);
            })
            .await;

        let conversation = client(&server)
            .generate("Rust, 5 years", "Backend Engineer", JobLevel::Intermediate)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(conversation, "HR1: Nice resume.\nHR2: Agreed.");
    }

    #[tokio::test]
    async fn api_error_carries_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(PATH);
                then.status(401).body("invalid api key");
            })
            .await;

        let error = client(&server)
            .generate("Rust", "Backend Engineer", JobLevel::Beginner)
            .await
            .unwrap_err();

        match error {
            GenerateError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("invalid api key"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_stream_is_an_empty_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(PATH);
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(format!("{}data: [DONE]\n\n", event("  \n")));
            })
            .await;

        let error = client(&server)
            .generate("Rust", "Backend Engineer", JobLevel::Advanced)
            .await
            .unwrap_err();

        assert!(matches!(error, GenerateError::EmptyResponse));
    }

    #[test]
    fn request_serialises_sampling_parameters() {
        let request = ChatRequest {
            model: "llama3-8b-8192",
            messages: vec![Message {
                role: "user",
                content: "hi",
            }],
            temperature: 1.0,
            max_tokens: 1024,
            top_p: 1.0,
            stream: true,
            stop: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "llama3-8b-8192");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["max_tokens"], 1024);
        assert_eq!(value["stream"], true);
        assert!(value["stop"].is_null());
    }
}
