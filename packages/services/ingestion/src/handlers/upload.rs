use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::models::*;

/// Upload contents as they arrive from a transport.
#[derive(Debug, Clone)]
pub enum UploadBody {
    /// Raw file bytes, optionally with the client's declared content type
    Raw { bytes: Vec<u8>, content_type: Option<String> },
    /// Base64 text or a browser data URL (`data:text/csv;base64,...`)
    Encoded(String),
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub body: UploadBody,
    pub secret: String,
}

impl UploadRequest {
    pub fn raw(filename: impl Into<String>, bytes: Vec<u8>, secret: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            body: UploadBody::Raw { bytes, content_type: None },
            secret: secret.into(),
        }
    }

    pub fn encoded(filename: impl Into<String>, contents: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            body: UploadBody::Encoded(contents.into()),
            secret: secret.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub bytes: Vec<u8>,
    pub content_type: Option<mime::Mime>,
}

impl UploadBody {
    /// Unwraps the transport encoding. Binary media types are refused before any CSV work.
    pub fn into_payload(self) -> Result<UploadPayload> {
        let (bytes, declared) = match self {
            UploadBody::Raw { bytes, content_type } => (bytes, content_type),
            UploadBody::Encoded(contents) => unwrap_encoded(&contents)?,
        };

        let content_type = declared.as_deref().and_then(|ct| ct.parse::<mime::Mime>().ok());
        if let Some(ct) = &content_type {
            let top = ct.type_();
            if top == mime::IMAGE || top == mime::AUDIO || top == mime::VIDEO {
                return Err(IngestionError::Decode(format!("unsupported content type {}", ct)));
            }
        }

        Ok(UploadPayload { bytes, content_type })
    }
}

fn unwrap_encoded(contents: &str) -> Result<(Vec<u8>, Option<String>)> {
    let contents = contents.trim();
    if let Some(rest) = contents.strip_prefix("data:") {
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| IngestionError::Decode("data URL has no payload separator".to_string()))?;
        let mut parts = header.split(';');
        let media_type = parts.next().filter(|m| !m.is_empty()).map(str::to_string);
        let is_base64 = parts.any(|p| p.eq_ignore_ascii_case("base64"));
        let bytes = if is_base64 {
            decode_base64(data)?
        } else {
            data.as_bytes().to_vec()
        };
        return Ok((bytes, media_type));
    }
    Ok((decode_base64(contents)?, None))
}

fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| IngestionError::Decode(format!("invalid base64 payload: {}", e)))
}
