mod error;
mod page;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower_http::trace::TraceLayer;

use crate::dialogue::JobLevel;
use crate::pipeline::{FeedbackError, FeedbackRequest, Pipeline};
use error::AppError;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/feedback", get(index).post(feedback))
        .route("/audio", get(audio))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;
    Ok(())
}

async fn index() -> Html<String> {
    Html(page::form())
}

async fn feedback(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let mut upload = None;
    let mut role = String::new();
    let mut level = JobLevel::Beginner;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "resume" => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let bytes = field.bytes().await?;
                if !file_name.is_empty() && !bytes.is_empty() {
                    upload = Some((file_name, bytes));
                }
            }
            "role" => role = field.text().await?,
            "level" => {
                let value = field.text().await?;
                level = value
                    .parse()
                    .map_err(|_| AppError::Validation(format!("Unknown job level `{value}`")))?;
            }
            other => tracing::debug!(field = other, "Ignoring form field"),
        }
    }

    let (file_name, bytes) = upload.ok_or(FeedbackError::MissingInput)?;

    // Keep the extension so the stored upload is recognisable on disk.
    let extension = std::path::Path::new(&file_name)
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| format!(".{extension}"))
        .unwrap_or_default();
    let stored = tempfile::Builder::new()
        .prefix("resume-")
        .suffix(&extension)
        .tempfile()
        .context("Failed to store upload")?;
    tokio::fs::write(stored.path(), &bytes)
        .await
        .context("Failed to store upload")?;

    tracing::info!(%file_name, bytes = bytes.len(), %role, %level, "Received resume");

    let request = FeedbackRequest {
        resume: stored.path().to_path_buf(),
        file_name,
        role,
        level,
    };
    let feedback = state.pipeline.run(&request).await?;

    let version = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_millis())
        .unwrap_or_default();
    Ok(Html(page::feedback(&feedback, &format!("/audio?v={version}"))))
}

async fn audio(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let target = state.pipeline.target();
    let bytes = match tokio::fs::read(&target.output).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Err(AppError::NoAudio),
        Err(error) => return Err(anyhow::Error::new(error).context("Failed to read audio").into()),
    };

    Ok((
        [
            (header::CONTENT_TYPE, target.format.content_type()),
            (header::CACHE_CONTROL, "no-store"),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{ScriptedGenerator, pipeline};
    use crate::render::tests::RecordingSynthesizer;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-RESUME-BOUNDARY";

    fn app(dir: &std::path::Path, reply: &str) -> (Router, Arc<RecordingSynthesizer>) {
        let synthesizer = Arc::new(RecordingSynthesizer::default());
        let pipeline = pipeline(
            dir,
            Arc::new(ScriptedGenerator::replying(reply)),
            synthesizer.clone(),
        );
        let state = AppState {
            pipeline: Arc::new(pipeline),
        };
        (router(state), synthesizer)
    }

    fn multipart_body(role: &str, level: &str, file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in [("role", role), ("level", level)] {
            body.extend(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = file {
            body.extend(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend(bytes);
            body.extend(b"\r\n");
        }
        body.extend(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/feedback")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn index_serves_form() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path(), "HR1: Hi");

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Generate Feedback"));
        assert!(html.contains("Intermediate"));
    }

    #[tokio::test]
    async fn upload_renders_dialogue_and_audio_player() {
        let dir = tempfile::tempdir().unwrap();
        let (app, synthesizer) = app(dir.path(), "HR1: <Bold> choice.\nHR2: Indeed.");
        let docx = crate::resume::docx_fixture(&["Jane Doe"]);

        let response = app
            .clone()
            .oneshot(upload(multipart_body(
                "Designer",
                "Advanced",
                Some(("jane.docx", docx.as_slice())),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Feedback generated successfully!"));
        assert!(html.contains("HR1: &lt;Bold&gt; choice.\nHR2: Indeed."));
        assert!(html.contains("<audio controls src=\"/audio?v="));
        assert_eq!(synthesizer.calls().len(), 2);

        let response = app
            .oneshot(Request::builder().uri("/audio").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.starts_with(b"RIFF"));
    }

    #[tokio::test]
    async fn missing_file_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path(), "HR1: Hi");

        let response = app
            .oneshot(upload(multipart_body("Designer", "Beginner", None)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let html = body_text(response).await;
        assert!(html.contains("Please upload a resume and enter the job role."));
    }

    #[tokio::test]
    async fn missing_role_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (app, synthesizer) = app(dir.path(), "HR1: Hi");
        let docx = crate::resume::docx_fixture(&["Jane Doe"]);

        let response = app
            .oneshot(upload(multipart_body("", "Beginner", Some(("cv.docx", docx.as_slice())))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(synthesizer.calls().is_empty());
    }

    #[tokio::test]
    async fn unsupported_format_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path(), "HR1: Hi");

        let response = app
            .oneshot(upload(multipart_body(
                "Chef",
                "Beginner",
                Some(("cv.txt", b"plain".as_slice())),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Unsupported file format"));
    }

    #[tokio::test]
    async fn unknown_level_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path(), "HR1: Hi");
        let docx = crate::resume::docx_fixture(&["Jane Doe"]);

        let response = app
            .oneshot(upload(multipart_body("Chef", "Wizard", Some(("cv.docx", docx.as_slice())))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Unknown job level `Wizard`"));
    }

    #[tokio::test]
    async fn audio_before_any_run_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path(), "HR1: Hi");

        let response = app
            .oneshot(Request::builder().uri("/audio").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
