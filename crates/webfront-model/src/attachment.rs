//! Inline file attachments.
//!
//! Files are stored inside the profile document as `data:` URLs rather than in
//! external blob storage, so every upload is capped at
//! [`MAX_INLINE_UPLOAD_BYTES`].

use crate::{ModelError, ModelResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upload cap: 1 MiB of raw file content.
pub const MAX_INLINE_UPLOAD_BYTES: usize = 1024 * 1024;

/// A contract or client upload entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    /// `data:<mime>;base64,<content>`
    pub url: String,
    pub date: String,
    /// Human-readable size, e.g. `12.5 KB`.
    pub size: String,
}

impl FileAttachment {
    /// Encode `bytes` inline. Fails before any encoding work when the file is
    /// over the cap or unnamed.
    pub fn inline(
        name: &str,
        mime_type: Option<&str>,
        bytes: &[u8],
        at: DateTime<Utc>,
    ) -> ModelResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ModelError::EmptyFileName);
        }
        if bytes.len() > MAX_INLINE_UPLOAD_BYTES {
            return Err(ModelError::UploadTooLarge {
                size: bytes.len(),
                limit: MAX_INLINE_UPLOAD_BYTES,
            });
        }

        let mime = mime_type.unwrap_or_else(|| guess_mime_type(name));
        Ok(Self {
            name: name.to_string(),
            url: format!("data:{};base64,{}", mime, STANDARD.encode(bytes)),
            date: at.format("%Y-%m-%d").to_string(),
            size: human_size(bytes.len()),
        })
    }

    /// Decode the inline payload back into bytes, if it is a base64 data URL.
    pub fn decode(&self) -> Option<Vec<u8>> {
        let (_, payload) = self.url.strip_prefix("data:")?.split_once(";base64,")?;
        STANDARD.decode(payload).ok()
    }
}

/// Best-effort MIME type from a file extension.
pub fn guess_mime_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

pub fn human_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f < KB {
        format!("{} B", bytes)
    } else if bytes_f < KB * KB {
        format!("{:.1} KB", bytes_f / KB)
    } else {
        format!("{:.1} MB", bytes_f / (KB * KB))
    }
}
