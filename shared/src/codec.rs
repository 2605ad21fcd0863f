//! # Entity Encoding Contract
//!
//! The Cache stores opaque bytes; every entity type that crosses the Cache
//! boundary implements [`Encodable`] so the Cache itself never needs to know
//! the shape of what it stores.
//!
//! The only implementation here is JSON via `serde_json`, generalizing the
//! inline `serde_json::to_string`/`from_str` pairs used elsewhere in this
//! codebase for any value stored in a remote key-value backend. The trait
//! carries no assumption about the wire format, so a binary codec could
//! implement it later without touching callers.

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::ProxyError;

/// A type that can be losslessly round-tripped through the Cache.
///
/// `decode(encode(value)) == value` for every value of an implementing type.
pub trait Encodable: Sized {
    fn encode(&self) -> Result<Vec<u8>, ProxyError>;
    fn decode(bytes: &[u8]) -> Result<Self, ProxyError>;
}

impl<T> Encodable for T
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self) -> Result<Vec<u8>, ProxyError> {
        serde_json::to_vec(self).map_err(ProxyError::Decode)
    }

    fn decode(bytes: &[u8]) -> Result<Self, ProxyError> {
        serde_json::from_slice(bytes).map_err(ProxyError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
    struct Sample {
        id: String,
        version: u64,
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let value = Sample { id: "flag-1".into(), version: 7 };
        let bytes = value.encode().expect("encode");
        let decoded = Sample::decode(&bytes).expect("decode");
        assert_eq!(value, decoded);
    }

    #[test]
    fn decode_of_garbage_bytes_is_corruption() {
        let err = Sample::decode(b"not json").unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Corruption);
    }
}
