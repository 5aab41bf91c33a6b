mod docx;
mod pdf;

#[cfg(test)]
pub(crate) use docx::tests::document as docx_fixture;

use std::path::Path;
use strum::{Display, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ResumeKind {
    Pdf,
    Docx,
}

impl ResumeKind {
    /// Picks the kind from a file name's extension.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        Path::new(file_name)
            .extension()
            .and_then(|extension| extension.to_str())
            .and_then(|extension| extension.parse().ok())
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read resume: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to extract text from PDF: {0}")]
    Pdf(String),

    #[error("Failed to extract text from DOCX: {0}")]
    Docx(String),

    #[error("Unable to extract text from {0}.")]
    NoText(ResumeKind),
}

/// Reads the resume at `path` as text.
pub async fn extract(path: &Path, kind: ResumeKind) -> Result<String, ExtractError> {
    let bytes = tokio::fs::read(path).await?;

    let parsed = tokio::task::spawn_blocking(move || match kind {
        ResumeKind::Pdf => pdf::extract(&bytes),
        ResumeKind::Docx => docx::extract(&bytes),
    })
    .await;

    let text = match parsed {
        Ok(result) => result?,
        Err(error) => {
            let message = format!("parser crashed: {error}");
            return Err(match kind {
                ResumeKind::Pdf => ExtractError::Pdf(message),
                ResumeKind::Docx => ExtractError::Docx(message),
            });
        }
    };

    if text.trim().is_empty() {
        return Err(ExtractError::NoText(kind));
    }

    tracing::info!(%kind, chars = text.len(), "Extracted resume text");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_comes_from_extension() {
        assert_eq!(ResumeKind::from_file_name("cv.pdf"), Some(ResumeKind::Pdf));
        assert_eq!(ResumeKind::from_file_name("My CV.DOCX"), Some(ResumeKind::Docx));
        assert_eq!(ResumeKind::from_file_name("cv.doc"), None);
        assert_eq!(ResumeKind::from_file_name("pdf"), None);
        assert_eq!(ResumeKind::from_file_name(""), None);
    }

    #[test]
    fn no_text_message_names_the_format() {
        assert_eq!(
            ExtractError::NoText(ResumeKind::Pdf).to_string(),
            "Unable to extract text from PDF."
        );
    }

    #[tokio::test]
    async fn extracts_docx_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.docx");
        std::fs::write(&path, docx_fixture(&["Jane Doe", "Rustacean"])).unwrap();

        let text = extract(&path, ResumeKind::Docx).await.unwrap();
        assert_eq!(text, "Jane Doe\nRustacean");
    }

    #[tokio::test]
    async fn empty_docx_has_no_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.docx");
        std::fs::write(&path, docx_fixture(&["", "   "])).unwrap();

        let error = extract(&path, ResumeKind::Docx).await.unwrap_err();
        assert!(matches!(error, ExtractError::NoText(ResumeKind::Docx)));
    }

    #[tokio::test]
    async fn invalid_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let error = extract(&path, ResumeKind::Pdf).await.unwrap_err();
        assert!(matches!(error, ExtractError::Pdf(_)));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let error = extract(Path::new("/nonexistent/resume.pdf"), ResumeKind::Pdf)
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractError::Io(_)));
    }
}
