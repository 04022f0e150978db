//! Image handles produced by `sc:ImageObject` fields

use std::fmt;
use std::sync::Arc;

/// Supported image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// JPEG format
    Jpeg,
    /// PNG format
    Png,
    /// BMP format
    Bmp,
    /// GIF format
    Gif,
    /// TIFF format
    Tiff,
    /// WebP format
    WebP,
    /// Unknown format
    Unknown,
}

impl ImageFormat {
    /// Detect image format from magic bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match bytes {
            // JPEG: FF D8 FF
            [0xFF, 0xD8, 0xFF, ..] => ImageFormat::Jpeg,

            // PNG: 89 50 4E 47 0D 0A 1A 0A
            [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => ImageFormat::Png,

            // GIF: 47 49 46 38
            [0x47, 0x49, 0x46, 0x38, ..] => ImageFormat::Gif,

            // TIFF: 49 49 2A 00 or 4D 4D 00 2A
            [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => ImageFormat::Tiff,

            // WebP: 52 49 46 46 ?? ?? ?? ?? 57 45 42 50
            [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => ImageFormat::WebP,

            // BMP: 42 4D
            [0x42, 0x4D, ..] => ImageFormat::Bmp,

            _ => ImageFormat::Unknown,
        }
    }

    /// MIME type of the format
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Unknown => "application/octet-stream",
        }
    }
}

/// Encoded image with its detected format
///
/// The bytes are shared, so cloning a record holding images is cheap. Dimensions are
/// only known when the bytes were decoded.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageHandle {
    format: ImageFormat,
    bytes: Arc<[u8]>,
    dimensions: Option<(u32, u32)>,
}

impl ImageHandle {
    /// Wrap encoded bytes, detecting the format from the magic bytes
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            format: ImageFormat::from_bytes(&bytes),
            bytes,
            dimensions: None,
        }
    }

    /// Attach decoded dimensions
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }

    /// Detected format
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Encoded bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Width and height, when decoded
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .field("dimensions", &self.dimensions)
            .finish()
    }
}
