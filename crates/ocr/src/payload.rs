use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Image payload is empty")]
    Empty,
    #[error("Unable to decode base64 image: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Payload is not a recognised image format")]
    UnrecognizedFormat,
}

/// Drop a `data:image/...;base64,` header if the client sent one.
pub fn strip_data_url(payload: &str) -> &str {
    let payload = payload.trim();
    if payload.starts_with("data:image") {
        payload.split_once(',').map(|(_, body)| body).unwrap_or("")
    } else {
        payload
    }
}

/// Turn the `image` field of a request into raw image bytes.
///
/// Line breaks inside the base64 body are tolerated. The decoded bytes must
/// carry the signature of an image format the transform layer can read.
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let body: String = strip_data_url(payload)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = STANDARD.decode(body)?;
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    image::guess_format(&bytes).map_err(|_| DecodeError::UnrecognizedFormat)?;
    Ok(bytes)
}
