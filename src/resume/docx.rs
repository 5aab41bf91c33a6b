use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{BufReader, Cursor};

use super::ExtractError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Paragraph texts of the main document part, one per line.
pub(super) fn extract(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| ExtractError::Docx(error.to_string()))?;
    let part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|error| ExtractError::Docx(format!("{DOCUMENT_PART}: {error}")))?;

    let mut reader = Reader::from_reader(BufReader::new(part));
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => match element.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" => current.clear(),
                _ => {}
            },
            Ok(Event::Empty(element)) => match element.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(text)) if in_text => {
                let text = text
                    .unescape()
                    .map_err(|error| ExtractError::Docx(error.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(element)) => match element.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(error) => return Err(ExtractError::Docx(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}
