//! PDF reports. The container is validated (and decrypted when it uses the
//! empty user password) but its content is not read.

use lopdf::Document;
use serde::Serialize;

use super::ParseError;
use crate::models::enums::DeviceFormat;

/// A PDF that opened cleanly but whose device data was not extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeferredExtraction {
    pub page_count: usize,
    pub encrypted: bool,
}

impl DeferredExtraction {
    pub fn explanation(&self) -> String {
        format!(
            "PDF device reports ({} page{}) are accepted but not yet extracted; upload the XML, LOG or BNK export instead",
            self.page_count,
            if self.page_count == 1 { "" } else { "s" }
        )
    }
}

pub fn inspect_pdf(bytes: &[u8]) -> Result<DeferredExtraction, ParseError> {
    let mut doc = Document::load_mem(bytes).map_err(|e| {
        ParseError::malformed(DeviceFormat::Pdf, 0, format!("Failed to parse PDF: {e}"))
    })?;

    let encrypted = doc.is_encrypted();
    if encrypted {
        doc.decrypt("").map_err(|e| {
            ParseError::malformed(
                DeviceFormat::Pdf,
                0,
                format!("PDF is password-protected and could not be opened: {e}"),
            )
        })?;
    }

    let page_count = doc.get_pages().len();
    tracing::debug!(page_count, encrypted, "PDF container accepted, extraction deferred");
    Ok(DeferredExtraction {
        page_count,
        encrypted,
    })
}
