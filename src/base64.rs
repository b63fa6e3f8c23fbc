//! Base64 encoding of file content on the JSON wire.
//!
//! File bytes travel inside JSON messages (`writeFile` content, `readFile`
//! data), so they are carried as standard, padded base64 strings.

use ::base64::{
    alphabet,
    engine::{general_purpose, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

/// Standard alphabet, accepting input with or without trailing padding.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes to standard base64.
///
/// # Example
/// ```
/// use fsbridge::base64::base64_encode;
/// assert_eq!(base64_encode(b"hello"), "aGVsbG8=");
/// ```
pub fn base64_encode(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}

/// Decode standard base64 to bytes.
///
/// Padding is optional, since some senders strip it.
pub fn base64_decode(s: &str) -> Result<Vec<u8>, ::base64::DecodeError> {
    STANDARD_LENIENT.decode(s)
}

/// Serde adapter for byte buffers, for use with `#[serde(with = "crate::base64::bytes")]`.
pub mod bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(data: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        serializer.serialize_str(&super::base64_encode(data.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        super::base64_decode(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[test]
    fn test_roundtrip() {
        let original = b"Hello, bridge!";
        let encoded = base64_encode(original);
        let decoded = base64_decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_without_padding() {
        assert_eq!(base64_decode("aGVsbG8").unwrap(), b"hello");
        assert_eq!(base64_decode("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_partial_padding() {
        assert_eq!(base64_decode("YQ").unwrap(), b"a");
        assert_eq!(base64_decode("YQ=").unwrap(), b"a");
        assert_eq!(base64_decode("YQ==").unwrap(), b"a");
    }

    #[test]
    fn test_decode_invalid() {
        assert!(base64_decode("not base64!").is_err());
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        #[serde(with = "crate::base64::bytes")]
        content: Vec<u8>,
    }

    #[test]
    fn test_serde_adapter() {
        let payload = Payload {
            content: (0..=255).collect(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.starts_with("{\"content\":\""));
        let restored: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, payload);
    }
}
