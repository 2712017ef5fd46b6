//! Image content sniffing using magic number detection.
//!
//! Types are decided by content, never by the name the bytes arrived under. The `infer` crate
//! covers the binary formats; SVG is text and is recognised by looking for an `<svg` root element
//! near the start of the document.

use crate::error::{Result, StoreError};
use std::collections::HashSet;

/// Bytes inspected when looking for an SVG root element.
const SVG_SCAN_BYTES: usize = 1024;

const DEFAULT_IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/svg+xml",
];

/// Information about detected content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeInfo {
    /// MIME type of the content
    pub mime_type: String,
    /// File extension used when storing content of this type
    pub extension: String,
}

/// Accepts a fixed set of image MIME types and rejects everything else.
#[derive(Debug, Clone)]
pub struct ImageSniffer {
    allowed: HashSet<String>,
}

impl ImageSniffer {
    /// Sniffer accepting PNG, JPEG, GIF, WebP and SVG.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allowed(DEFAULT_IMAGE_TYPES.iter().copied())
    }

    /// Sniffer accepting only the given MIME types.
    #[must_use]
    pub fn with_allowed<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Detects the content type of `content`.
    ///
    /// # Errors
    /// Returns [`StoreError::UnsupportedContentType`] if the content is not recognised or its
    /// type is not in the allowed set.
    pub fn sniff(&self, content: &[u8]) -> Result<FileTypeInfo> {
        let detected = if let Some(kind) = infer::get(content) {
            FileTypeInfo {
                mime_type: kind.mime_type().to_string(),
                extension: kind.extension().to_string(),
            }
        } else if looks_like_svg(content) {
            FileTypeInfo {
                mime_type: "image/svg+xml".to_string(),
                extension: "svg".to_string(),
            }
        } else {
            return Err(StoreError::UnsupportedContentType {
                content_type: "unknown".to_string(),
            });
        };

        if !self.allowed.contains(&detected.mime_type) {
            return Err(StoreError::UnsupportedContentType {
                content_type: detected.mime_type,
            });
        }

        Ok(detected)
    }

    #[must_use]
    pub fn is_allowed(&self, mime_type: &str) -> bool {
        self.allowed.contains(mime_type)
    }
}

impl Default for ImageSniffer {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_like_svg(content: &[u8]) -> bool {
    let head = &content[..content.len().min(SVG_SCAN_BYTES)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with('<') && text.contains("<svg") && !text.to_ascii_lowercase().contains("<html")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_detects_png() {
        let info = ImageSniffer::new().sniff(PNG_HEADER).unwrap();
        assert_eq!(info.mime_type, "image/png");
        assert_eq!(info.extension, "png");
    }

    #[test]
    fn test_detects_svg() {
        let svg = br#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg"></svg>"#;
        let info = ImageSniffer::new().sniff(svg).unwrap();
        assert_eq!(info.mime_type, "image/svg+xml");
        assert_eq!(info.extension, "svg");
    }

    #[test]
    fn test_rejects_html_error_page() {
        let html = b"<!DOCTYPE html><html><body>502 Bad Gateway</body></html>";
        assert!(matches!(
            ImageSniffer::new().sniff(html),
            Err(StoreError::UnsupportedContentType { .. })
        ));
    }

    #[test]
    fn test_rejects_disallowed_type() {
        let sniffer = ImageSniffer::with_allowed(["image/jpeg"]);
        assert!(!sniffer.is_allowed("image/png"));
        assert!(sniffer.sniff(PNG_HEADER).is_err());
    }
}
