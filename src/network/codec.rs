//! Wire Codec Helpers
//!
//! The input record's byte layout is fixed by §3 and already encoded/
//! decoded in [`crate::sim::input`]; this module only bridges that raw
//! byte layout into the JSON envelope `network::protocol` uses, via a
//! hex-encoded newtype (`serde_json` has no native byte-string type).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A byte string that serializes as a lowercase hex string in JSON
/// instead of an array of numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

impl Serialize for HexBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Ok(HexBytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_bytes_roundtrip() {
        let original = HexBytes(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        let decoded: HexBytes = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_hex_bytes_rejects_invalid_hex() {
        let result: Result<HexBytes, _> = serde_json::from_str("\"not-hex!\"");
        assert!(result.is_err());
    }
}
