//! Decoder module for embedded image payloads
//!
//! Handles conversion between the pipeline's pixel buffers and the
//! `data:<mime>;base64,<payload>` form exchanged with callers:
//! - Data URL parsing
//! - Payload decode into an RGBA raster
//! - Lossless PNG re-encoding
//! - Mime sniffing for pass-through payloads

use crate::error::{PipelineError, Result};
use crate::types::{ImageSource, NormalizedImage, RasterImage};
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use std::io::Cursor;

const PNG_MIME: &str = "image/png";

/// Split a base64 data URL into its mime type and payload
pub fn parse_data_url(data_url: &str) -> Result<(&str, &str)> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| PipelineError::Decode("input is not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| PipelineError::Decode("data URL has no payload".to_string()))?;
    let mime = header.strip_suffix(";base64").ok_or_else(|| {
        PipelineError::Decode("only base64-encoded data URLs are supported".to_string())
    })?;
    Ok((mime, payload))
}

/// Decode the raw payload bytes of a base64 data URL
pub fn payload_bytes(data_url: &str) -> Result<Vec<u8>> {
    let (_, payload) = parse_data_url(data_url)?;
    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|err| PipelineError::Decode(format!("invalid base64 payload: {}", err)))
}

/// Decode encoded image bytes (PNG, JPEG, ...) into an RGBA raster
pub fn decode_bytes(bytes: &[u8]) -> Result<RasterImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| PipelineError::Decode(err.to_string()))?;
    Ok(image.to_rgba8())
}

/// Decode a base64 data URL into an RGBA raster
pub fn decode_data_url(data_url: &str) -> Result<RasterImage> {
    decode_bytes(&payload_bytes(data_url)?)
}

/// Encode a raster as PNG bytes
pub fn encode_png(image: &RasterImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|err| PipelineError::Encode(err.to_string()))?;
    Ok(png_bytes)
}

/// Encode a raster as a `data:image/png;base64,...` string
pub fn encode_png_data_url(image: &RasterImage) -> Result<String> {
    Ok(to_data_url(PNG_MIME, &encode_png(image)?))
}

/// Wrap already-encoded bytes in a data URL, sniffing the mime type
pub fn wrap_bytes(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    to_data_url(mime, bytes)
}

/// File extension matching a data URL's mime type
pub fn extension_for(data_url: &str) -> &'static str {
    parse_data_url(data_url)
        .ok()
        .and_then(|(mime, _)| ImageFormat::from_mime_type(mime))
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        general_purpose::STANDARD.encode(bytes)
    )
}

impl ImageSource {
    /// Resolve the source into a freshly allocated raster
    pub fn decode(&self) -> Result<RasterImage> {
        match self {
            ImageSource::DataUrl(data_url) => decode_data_url(data_url),
            ImageSource::Bytes(bytes) => decode_bytes(bytes),
            ImageSource::Raster(image) => Ok(image.clone()),
        }
    }

    /// The source in embedded-payload form, without re-encoding encoded inputs
    pub fn to_data_url(&self) -> Result<String> {
        match self {
            ImageSource::DataUrl(data_url) => Ok(data_url.clone()),
            ImageSource::Bytes(bytes) => Ok(wrap_bytes(bytes)),
            ImageSource::Raster(image) => encode_png_data_url(image),
        }
    }
}

impl NormalizedImage {
    /// Raw bytes of the encoded page (PNG unless the pipeline degraded)
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        payload_bytes(&self.data_url)
    }

    /// Base64 payload without the data URL header
    pub fn base64_payload(&self) -> Result<&str> {
        Ok(parse_data_url(&self.data_url)?.1)
    }

    /// File extension for writing the payload to disk
    pub fn extension(&self) -> &'static str {
        extension_for(&self.data_url)
    }
}
