//! Serialization boundary (C8): record <-> byte-string codec.
//!
//! The typed container is generic over this trait so a caller can swap the
//! wire format without touching index or transaction logic. The default
//! implementation is `bincode`'s serde backend, a compact length-prefixed
//! binary encoding.

use crate::error::Error;
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;

/// A pluggable record <-> byte-string codec.
pub trait Codec<T> {
    fn encode(record: &T) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Result<T, Error>;
}

/// The default codec: `bincode`'s serde backend.
///
/// Deterministic only within a single process lifetime of a given `T` -
/// the container never compares encoded bytes across schema versions.
pub struct SerdeBincode<T>(PhantomData<T>);

impl<T> Codec<T> for SerdeBincode<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(record: &T) -> Vec<u8> {
        bincode::serialize(record).expect("serialization of in-memory value cannot fail")
    }

    fn decode(bytes: &[u8]) -> Result<T, Error> {
        bincode::deserialize(bytes).map_err(|e| Error::DecodeError(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Member {
        first_name: String,
        last_name: String,
        enrolled: u64,
    }

    #[test]
    fn round_trips_a_record() {
        let m = Member {
            first_name: "bert".into(),
            last_name: "hubert".into(),
            enrolled: 0,
        };
        let bytes = SerdeBincode::<Member>::encode(&m);
        let decoded = SerdeBincode::<Member>::decode(&bytes).unwrap();
        assert_eq!(m, decoded);
    }

    #[test]
    fn rejects_garbage() {
        let err = SerdeBincode::<Member>::decode(&[0xff; 2]).unwrap_err();
        assert!(matches!(err, Error::DecodeError(_)));
    }
}
