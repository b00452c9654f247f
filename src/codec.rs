//! Decoding of base64 media payloads, either raw or wrapped in a data URI
//! (`data:image/jpeg;base64,<payload>`).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not a decodable image: {0}")]
    Image(#[from] image::ImageError),
}

/// Drops everything up to and including the first comma, if there is one.
pub fn strip_data_uri(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(STANDARD.decode(strip_data_uri(payload).trim())?)
}

pub fn decode_image(payload: &str) -> Result<DynamicImage, DecodeError> {
    let bytes = decode_base64(payload)?;
    Ok(image::load_from_memory(&bytes)?)
}

/// Video payloads are only ever stored, so they stop at raw bytes.
pub fn decode_video(payload: &str) -> Result<Vec<u8>, DecodeError> {
    decode_base64(payload)
}
