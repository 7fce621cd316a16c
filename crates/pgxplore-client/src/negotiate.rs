//! Response format negotiation between tabular (JSON) and hierarchical (XML)
//! upstream bodies.

use crate::document::Document;
use crate::error::ApiError;
use crate::http_client::HttpResponse;

/// Decoder selection for one call.
///
/// `Auto` trusts the response content-type header. Endpoints whose header is
/// unreliable (the clinical efetch endpoint answers XML regardless of what it
/// advertises) pin the decoder explicitly instead of string-matching on URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatHint {
    #[default]
    Auto,
    Json,
    Xml,
}

/// Uniform in-memory value produced from a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Tabular structure: mapping/array of scalars.
    Json(serde_json::Value),
    /// Hierarchical document, to be projected by an extraction plan.
    Document(Document),
}

impl Payload {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Document(_) => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(document) => Some(document),
            Self::Json(_) => None,
        }
    }
}

fn looks_like_xml(response: &HttpResponse) -> bool {
    response
        .content_type
        .as_deref()
        .is_some_and(|value| value.to_ascii_lowercase().contains("xml"))
}

/// Decodes a successful response body per the hint, or the content-type
/// header when the hint is `Auto`. Malformed bodies are fatal parse errors,
/// distinct from HTTP-level failures; they are never retried.
pub fn negotiate(
    destination: &str,
    response: &HttpResponse,
    hint: FormatHint,
) -> Result<Payload, ApiError> {
    let as_xml = match hint {
        FormatHint::Xml => true,
        FormatHint::Json => false,
        FormatHint::Auto => looks_like_xml(response),
    };

    if as_xml {
        let document = Document::parse(&response.body).map_err(|e| ApiError::Parse {
            destination: destination.to_owned(),
            detail: e.to_string(),
        })?;
        Ok(Payload::Document(document))
    } else {
        let value = serde_json::from_str(&response.body).map_err(|e| ApiError::Parse {
            destination: destination.to_owned(),
            detail: format!("json decode failed: {e}"),
        })?;
        Ok(Payload::Json(value))
    }
}
