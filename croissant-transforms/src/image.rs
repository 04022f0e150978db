//! Image decoding for `sc:ImageObject` fields
//!
//! Without the `image` feature, handles carry the encoded bytes and the format
//! detected from magic bytes. With it, the bytes are decoded once to validate them
//! and record the dimensions.

use croissant_core::ImageHandle;

use crate::error::Result;

/// Validate an image handle, attaching its dimensions when a decoder is available
#[cfg(feature = "image")]
pub fn decode(handle: ImageHandle) -> Result<ImageHandle> {
    use crate::error::Error;
    use image::GenericImageView;

    let decoded = image::load_from_memory(handle.bytes())
        .map_err(|e| Error::Image(format!("{} image: {e}", handle.format().mime_type())))?;
    let (width, height) = decoded.dimensions();
    Ok(handle.with_dimensions(width, height))
}

/// Validate an image handle, attaching its dimensions when a decoder is available
#[cfg(not(feature = "image"))]
#[allow(clippy::unnecessary_wraps)]
pub fn decode(handle: ImageHandle) -> Result<ImageHandle> {
    Ok(handle)
}
