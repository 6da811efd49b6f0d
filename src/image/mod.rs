//! Image input validation and encoding
//!
//! Wraps the raw bytes handed to providers, enforcing the supported formats
//! and the upload size limit before anything goes over the wire.

pub mod fetch;

pub use fetch::ImageFetcher;

use crate::{Error, Result};
use base64::Engine as _;
use std::fmt;

/// Largest image accepted for analysis (10 MiB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMime {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageMime {
    /// Parse a declared MIME type such as `image/png` or `image/jpeg; q=1`.
    pub fn parse(declared: &str) -> Option<Self> {
        let essence = declared.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageMime::Jpeg),
            "image/png" => Some(ImageMime::Png),
            "image/webp" => Some(ImageMime::Webp),
            "image/gif" => Some(ImageMime::Gif),
            _ => None,
        }
    }

    /// Infer the format from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            image::ImageFormat::Jpeg => Some(ImageMime::Jpeg),
            image::ImageFormat::Png => Some(ImageMime::Png),
            image::ImageFormat::WebP => Some(ImageMime::Webp),
            image::ImageFormat::Gif => Some(ImageMime::Gif),
            other => {
                tracing::debug!("Sniffed unsupported image format {:?}", other);
                None
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Webp => "image/webp",
            ImageMime::Gif => "image/gif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "jpg",
            ImageMime::Png => "png",
            ImageMime::Webp => "webp",
            ImageMime::Gif => "gif",
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated image ready to be sent to providers.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    bytes: Vec<u8>,
    mime: ImageMime,
    source_url: Option<String>,
}

impl ImageInput {
    /// Validate bytes against a declared MIME type.
    pub fn new(bytes: Vec<u8>, declared_mime: &str) -> Result<Self> {
        let mime = ImageMime::parse(declared_mime)
            .ok_or_else(|| Error::UnsupportedMediaType(declared_mime.to_string()))?;
        Self::with_mime(bytes, mime)
    }

    /// Validate bytes whose type is only known from their content.
    pub fn sniffed(bytes: Vec<u8>) -> Result<Self> {
        Self::check_size(&bytes)?;
        let mime = ImageMime::sniff(&bytes)
            .ok_or_else(|| Error::UnsupportedMediaType("unrecognised image data".to_string()))?;
        Self::with_mime(bytes, mime)
    }

    pub fn with_mime(bytes: Vec<u8>, mime: ImageMime) -> Result<Self> {
        Self::check_size(&bytes)?;
        Ok(Self {
            bytes,
            mime,
            source_url: None,
        })
    }

    fn check_size(bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::EmptyImage);
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(Error::ImageTooLarge {
                size: bytes.len(),
                limit: MAX_IMAGE_BYTES,
            });
        }
        Ok(())
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// File name used for multipart uploads.
    pub fn file_name(&self) -> String {
        format!("image.{}", self.mime.extension())
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    pub const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
    pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    pub const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00";
    pub const WEBP: &[u8] = &[
        0x52, 0x49, 0x46, 0x46, 0x00, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50,
    ];
}
