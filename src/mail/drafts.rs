use base64::{Engine as _, engine::general_purpose};
use log::{debug, warn};

use crate::domain::email::{DraftRequest, DraftResult};
use crate::error::{DraftSubmissionError, ValidationError};
use crate::mail::api::ServiceHandle;

/// Bytes of UTF-8 per RFC 2047 encoded-word, keeping each word under 75 chars.
const ENCODED_WORD_CHUNK: usize = 45;
const BASE64_LINE: usize = 76;

/// Whitespace-only fields count as empty.
pub fn validate(request: &DraftRequest) -> Result<(), ValidationError> {
    for (name, value) in [
        ("to", &request.to),
        ("subject", &request.subject),
        ("body", &request.body),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyField(name));
        }
    }
    Ok(())
}

/// Header values must stay on one line.
fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in value.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_CHUNK {
            words.push(std::mem::take(&mut chunk));
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(chunk);
    }

    words
        .iter()
        .map(|w| format!("=?utf-8?b?{}?=", general_purpose::STANDARD.encode(w)))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

fn crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// Build a single-part text/plain RFC 5322 message.
pub fn compose_message(request: &DraftRequest) -> String {
    let to = single_line(&request.to);
    let subject = encode_header_value(&single_line(&request.subject));

    let (encoding, body) = if request.body.is_ascii() {
        ("7bit", crlf(&request.body))
    } else {
        let encoded = general_purpose::STANDARD.encode(request.body.as_bytes());
        let lines: Vec<&str> = encoded
            .as_bytes()
            .chunks(BASE64_LINE)
            // base64 output is ASCII, so every chunk is valid UTF-8
            .map(|c| std::str::from_utf8(c).unwrap_or_default())
            .collect();
        ("base64", lines.join("\r\n"))
    };

    format!(
        "To: {to}\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/plain; charset=\"utf-8\"\r\n\
         Content-Transfer-Encoding: {encoding}\r\n\
         \r\n\
         {body}"
    )
}

/// Transport encoding the drafts endpoint expects for `raw`.
pub fn encode_raw(message: &str) -> String {
    general_purpose::URL_SAFE.encode(message.as_bytes())
}

#[derive(Debug, Clone, Default)]
pub struct DraftCreator;

impl DraftCreator {
    pub fn new() -> Self {
        Self
    }

    /// Validation problems are returned as errors before anything is sent.
    /// Remote failures come back inside `DraftResult::Failed`.
    pub fn create(
        &self,
        handle: &ServiceHandle,
        request: &DraftRequest,
    ) -> Result<DraftResult, ValidationError> {
        validate(request)?;

        let raw = encode_raw(&compose_message(request));
        match handle.create_draft(&raw) {
            Ok(draft_id) => {
                debug!("created draft {draft_id} to {}", request.to);
                Ok(DraftResult::Created { draft_id })
            }
            Err(e) => {
                warn!("draft to {} failed: {e}", request.to);
                Ok(DraftResult::Failed(DraftSubmissionError(e)))
            }
        }
    }
}
