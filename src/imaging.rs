//! PNG normalisation and data-URL encoding.
//!
//! Everything written to the checkpoint directories is PNG, whatever format
//! the client uploaded or the image API returned.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;

use crate::error::{Banana3dError, Result};

/// Return `bytes` as PNG. Input must decode fully; valid PNG is then passed
/// through untouched and any other format is re-encoded.
pub fn to_png(bytes: &[u8]) -> Result<Vec<u8>> {
    let format = image::guess_format(bytes)
        .map_err(|e| Banana3dError::InvalidImage(format!("unrecognised format: {e}")))?;

    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| Banana3dError::InvalidImage(format!("decode {format:?}: {e}")))?;

    if format == ImageFormat::Png {
        return Ok(bytes.to_vec());
    }

    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| Banana3dError::InvalidImage(format!("encode png: {e}")))?;
    Ok(out.into_inner())
}

/// `data:image/png;base64,...`
pub fn to_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| Banana3dError::InvalidImage(format!("invalid base64: {e}")))
}
