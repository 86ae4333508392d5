//! Image payload decoding
//!
//! The `image` field arrives either as bare base64 or as a data URI
//! (`data:image/png;base64,....`). Decoding happens in three steps, each with
//! its own failure:
//!
//! 1. strip the data-URI declaration up to and including the first comma
//! 2. base64-decode the remainder and check it against the size limit
//! 3. decode the image container
//!
//! The size check runs before the container is touched, so oversized payloads
//! never reach the image decoder.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::DynamicImage;
use thiserror::Error;

const DATA_URI_PREFIX: &str = "data:";

/// Image payload decoding failures
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid image data: data URI has no ',' before the payload")]
    MalformedDataUri,

    #[error("Invalid image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Invalid image data: {0}")]
    Container(#[from] image::ImageError),
}

/// Remove an inline data-URI declaration, if present
pub fn strip_data_uri(field: &str) -> Result<&str, DecodeError> {
    if !field.starts_with(DATA_URI_PREFIX) {
        return Ok(field);
    }
    field
        .split_once(',')
        .map(|(_, payload)| payload)
        .ok_or(DecodeError::MalformedDataUri)
}

/// Decode the payload to raw bytes, enforcing the size limit
pub fn decode_payload(field: &str, max_bytes: usize) -> Result<Vec<u8>, DecodeError> {
    let payload = strip_data_uri(field)?;
    // Line-wrapped (MIME style) payloads are accepted
    let compact: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let raw = STANDARD.decode(&compact)?;
    if raw.len() > max_bytes {
        return Err(DecodeError::TooLarge {
            size: raw.len(),
            limit: max_bytes,
        });
    }
    Ok(raw)
}

/// Byte length the payload decodes to, computed from the base64 text alone.
///
/// Exact for well-formed payloads; never larger than what a successful
/// [`decode_payload`] would return.
pub fn decoded_len(field: &str) -> Result<usize, DecodeError> {
    let payload = strip_data_uri(field)?;
    let mut symbols = 0usize;
    let mut padding = 0usize;
    for b in payload.bytes().filter(|b| !b.is_ascii_whitespace()) {
        symbols += 1;
        padding = if b == b'=' { padding + 1 } else { 0 };
    }
    let tail = match symbols % 4 {
        2 => 1,
        3 => 2,
        _ => 0,
    };
    Ok(((symbols / 4) * 3 + tail).saturating_sub(padding.min(2)))
}

/// Decode the payload all the way to an image
pub fn decode_image(field: &str, max_bytes: usize) -> Result<DynamicImage, DecodeError> {
    let raw = decode_payload(field, max_bytes)?;
    let image = image::load_from_memory(&raw)?;
    tracing::debug!(
        bytes = raw.len(),
        width = image.width(),
        height = image.height(),
        "decoded input image"
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_base64(width: u32, height: u32) -> String {
        let image = RgbImage::from_pixel(width, height, Rgb([200, 10, 10]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_strip_data_uri() {
        assert_eq!(strip_data_uri("data:image/png;base64,QUJD").unwrap(), "QUJD");
        assert_eq!(strip_data_uri("QUJD").unwrap(), "QUJD");
        // Only the first comma separates the declaration
        assert_eq!(strip_data_uri("data:x,AB,CD").unwrap(), "AB,CD");
    }

    #[test]
    fn test_data_uri_without_comma() {
        assert!(matches!(
            strip_data_uri("data:image/png;base64"),
            Err(DecodeError::MalformedDataUri)
        ));
    }

    #[test]
    fn test_decode_plain_and_data_uri() {
        let encoded = png_base64(4, 3);
        let plain = decode_image(&encoded, 1 << 20).unwrap();
        assert_eq!((plain.width(), plain.height()), (4, 3));

        let uri = format!("data:image/png;base64,{encoded}");
        let wrapped = decode_image(&uri, 1 << 20).unwrap();
        assert_eq!((wrapped.width(), wrapped.height()), (4, 3));
    }

    #[test]
    fn test_line_wrapped_payload() {
        let image = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 90]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let encoded = STANDARD.encode(bytes);
        assert!(encoded.len() > 2 * 76);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| format!("{}\r\n", std::str::from_utf8(line).unwrap()))
            .collect();

        let image = decode_image(&wrapped, 1 << 20).unwrap();
        assert_eq!((image.width(), image.height()), (16, 16));

        let uri = format!("data:image/png;base64,{wrapped}");
        assert!(decode_image(&uri, 1 << 20).is_ok());
    }

    #[test]
    fn test_decoded_len_matches_decode() {
        for len in [0usize, 1, 2, 3, 4, 5, 100, 1000] {
            let encoded = STANDARD.encode(vec![7u8; len]);
            assert_eq!(decoded_len(&encoded).unwrap(), len);
            assert_eq!(decode_payload(&encoded, usize::MAX).unwrap().len(), len);
        }
        let uri = format!("data:image/png;base64,{}", STANDARD.encode([1u8; 10]));
        assert_eq!(decoded_len(&uri).unwrap(), 10);
        assert_eq!(decoded_len("=").unwrap(), 0);
        assert!(decoded_len("data:no-comma").is_err());
    }

    #[test]
    fn test_invalid_base64() {
        let err = decode_image("!!!not base64!!!", 1 << 20).unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)));
        assert!(err.to_string().starts_with("Invalid image data"));
    }

    #[test]
    fn test_size_limit_checked_before_container_decode() {
        // Not an image at all: if the container decoder ran first this would be
        // a Container error instead of TooLarge
        let encoded = STANDARD.encode(vec![0u8; 64]);
        let err = decode_image(&encoded, 63).unwrap_err();
        assert!(matches!(err, DecodeError::TooLarge { size: 64, limit: 63 }));
    }

    #[test]
    fn test_limit_is_inclusive() {
        let encoded = STANDARD.encode(vec![0u8; 64]);
        assert_eq!(decode_payload(&encoded, 64).unwrap().len(), 64);
    }

    #[test]
    fn test_garbage_container() {
        let encoded = STANDARD.encode(b"definitely not a png");
        assert!(matches!(
            decode_image(&encoded, 1 << 20),
            Err(DecodeError::Container(_))
        ));
    }
}
