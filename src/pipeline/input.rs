//! Input resolution: turn a caller's upload into a validated [`DocumentPayload`].
//!
//! Every check here runs before any external call is made. An oversized file,
//! an unsupported type, or bytes that contradict their declared MIME type are
//! all rejected locally as invalid input, so a bad upload never costs an OCR
//! request.
//!
//! Content sniffing uses the `%PDF` magic for PDFs and
//! [`image::guess_format`] for images. Formats `image` cannot recognise
//! (HEIC) are accepted on their declared type alone.

use crate::error::AdvisorError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// MIME types the OCR stage accepts.
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/gif",
    "image/heic",
];

/// Raw document bytes plus their MIME type. Lives for one request only.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentPayload {
    bytes: Vec<u8>,
    mime_type: String,
}

// Never print the bytes: they are an unredacted identity document.
impl fmt::Debug for DocumentPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentPayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl DocumentPayload {
    /// Validate `bytes` against the declared `mime_type` and size limit.
    pub fn new(
        bytes: Vec<u8>,
        mime_type: &str,
        max_bytes: usize,
    ) -> Result<Self, AdvisorError> {
        if bytes.is_empty() {
            return Err(AdvisorError::invalid("document is empty"));
        }
        if bytes.len() > max_bytes {
            return Err(AdvisorError::DocumentTooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }

        let mime_type = normalise_mime(mime_type);
        if !ACCEPTED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(AdvisorError::UnsupportedMimeType { mime: mime_type });
        }

        if let Some(detected) = sniff_mime(&bytes) {
            if detected != mime_type {
                return Err(AdvisorError::MimeMismatch {
                    declared: mime_type,
                    detected: detected.to_string(),
                });
            }
        } else if mime_type != "image/heic" {
            return Err(AdvisorError::MimeMismatch {
                declared: mime_type,
                detected: "unrecognised content".to_string(),
            });
        }

        Ok(Self { bytes, mime_type })
    }

    /// Decode a base64 upload, optionally wrapped as a `data:` URI.
    pub fn from_base64(
        data: &str,
        mime_type: &str,
        max_bytes: usize,
    ) -> Result<Self, AdvisorError> {
        let encoded = match data.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => data,
        };
        // Reject before decoding: base64 is 4/3 the size of the payload.
        if encoded.len() / 4 * 3 > max_bytes.saturating_add(3) {
            return Err(AdvisorError::DocumentTooLarge {
                size: encoded.len() / 4 * 3,
                limit: max_bytes,
            });
        }
        let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| AdvisorError::invalid(format!("document is not valid base64: {e}")))?;
        Self::new(bytes, mime_type, max_bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf"
    }

    /// Base64 body for the multimodal request.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Lower-case, strip parameters, and fold common aliases.
fn normalise_mime(mime: &str) -> String {
    let base = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match base.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "application/x-pdf" => "application/pdf".to_string(),
        _ => base,
    }
}

/// Detect the MIME type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a CLI argument (local path or HTTP(S) URL) to a payload.
///
/// The MIME type is taken from the content itself.
pub async fn resolve_document(
    input: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<DocumentPayload, AdvisorError> {
    let bytes = if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await?
    } else {
        read_local(input, max_bytes).await?
    };

    let mime = sniff_mime(&bytes).ok_or_else(|| {
        AdvisorError::invalid(format!("'{input}' is neither a PDF nor a recognised image"))
    })?;
    DocumentPayload::new(bytes, mime, max_bytes)
}

/// Read a local file, validating existence, permissions and size.
async fn read_local(path_str: &str, max_bytes: usize) -> Result<Vec<u8>, AdvisorError> {
    let path = PathBuf::from(path_str);

    let meta = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AdvisorError::PermissionDenied { path });
        }
        Err(_) => return Err(AdvisorError::FileNotFound { path }),
    };
    if meta.len() > max_bytes as u64 {
        return Err(AdvisorError::DocumentTooLarge {
            size: meta.len() as usize,
            limit: max_bytes,
        });
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => AdvisorError::PermissionDenied { path: path.clone() },
        _ => AdvisorError::FileNotFound { path: path.clone() },
    })?;

    debug!("Read local document: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

/// Download a URL into memory.
async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<Vec<u8>, AdvisorError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AdvisorError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AdvisorError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AdvisorError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AdvisorError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes as u64 {
            return Err(AdvisorError::DocumentTooLarge {
                size: len as usize,
                limit: max_bytes,
            });
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AdvisorError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
