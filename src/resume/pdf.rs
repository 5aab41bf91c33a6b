use super::ExtractError;

pub(super) fn extract(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|error| ExtractError::Pdf(error.to_string()))
}
