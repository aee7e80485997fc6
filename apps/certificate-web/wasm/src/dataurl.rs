//! `data:` URL decoding for canvas exports.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("Not a data URL")]
    NotDataUrl,

    #[error("Data URL has no payload separator")]
    MissingComma,

    #[error("Invalid base64 payload: {0}")]
    Base64(String),
}

/// A decoded `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Decode `data:[<mime>][;base64],<payload>`.
///
/// A canvas with no area exports `data:,`, which decodes to an empty
/// payload rather than an error.
pub fn decode(url: &str) -> Result<DataUrl, DataUrlError> {
    let rest = url.strip_prefix("data:").ok_or(DataUrlError::NotDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUrlError::MissingComma)?;

    let (mime_type, is_base64) = match header.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (header, false),
    };
    let mime_type = mime_type.split(';').next().unwrap_or_default().to_string();

    let bytes = if is_base64 {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| DataUrlError::Base64(e.to_string()))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };
    Ok(DataUrl { mime_type, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_base64_png_payload() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode(b"\x89PNG\r\n"));
        let decoded = decode(&url).unwrap();
        assert_eq!(decoded.mime_type, "image/png");
        assert_eq!(decoded.bytes, b"\x89PNG\r\n".to_vec());
    }

    #[test]
    fn test_empty_canvas_export() {
        let decoded = decode("data:,").unwrap();
        assert_eq!(decoded.mime_type, "");
        assert!(decoded.bytes.is_empty());
    }

    #[test]
    fn test_percent_encoded_payload() {
        let decoded = decode("data:text/plain;charset=utf-8,Au%20g%2Ft").unwrap();
        assert_eq!(decoded.mime_type, "text/plain");
        assert_eq!(decoded.bytes, b"Au g/t".to_vec());
    }

    #[test]
    fn test_rejects_other_urls() {
        assert_eq!(decode("blob:https://x/1"), Err(DataUrlError::NotDataUrl));
        assert_eq!(decode("data:image/png;base64"), Err(DataUrlError::MissingComma));
        assert!(matches!(
            decode("data:image/png;base64,@@@"),
            Err(DataUrlError::Base64(_))
        ));
    }
}
