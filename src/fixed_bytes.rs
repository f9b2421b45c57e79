// SPDX-License-Identifier: MIT

//! Fixed-length byte array types with serialization support
//!
//! This module provides a wrapper type for fixed-length byte arrays that implements
//! serialization and deserialization via serde. In CBOR the array is a byte string;
//! in JSON it is a standard base64 string.
//!
//! # Examples
//!
//! ```rust
//! use corimkit::fixed_bytes::FixedBytes;
//!
//! // Create a 32-byte fixed array
//! let bytes: FixedBytes<32> = FixedBytes([0u8; 32]);
//!
//! // Access underlying array
//! let array: &[u8; 32] = bytes.as_ref();
//! ```
use std::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From};
use serde::{
    de::{Error, Visitor},
    Deserialize, Serialize, Serializer,
};

/// Visitor implementation for deserializing fixed-size byte arrays
struct FixedBytesVisitor<'de, const N: usize>(PhantomData<&'de [u8; N]>);

impl<'de, const N: usize> Visitor<'de> for FixedBytesVisitor<'de, N> {
    type Value = FixedBytes<N>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a byte array of length {}", N)
    }

    fn visit_borrowed_bytes<E: Error>(self, v: &'de [u8]) -> Result<Self::Value, E> {
        self.visit_bytes(v)
    }

    fn visit_byte_buf<E: Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        self.visit_bytes(&v)
    }

    fn visit_bytes<E: Error>(self, value: &[u8]) -> Result<Self::Value, E> {
        FixedBytes::try_from(value).map_err(E::custom)
    }

    fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
        let decoded = STANDARD.decode(v).map_err(E::custom)?;
        self.visit_bytes(&decoded)
    }
}

/// A fixed-length byte array wrapper with serialization support
///
/// # Type Parameters
///
/// * `N` - The fixed size of the byte array
#[derive(From, AsMut, AsRef, Deref, DerefMut, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedBytes<const N: usize>(pub [u8; N]);

impl<const N: usize> TryFrom<&[u8]> for FixedBytes<N> {
    type Error = crate::CoreError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; N] = value
            .try_into()
            .map_err(|_| crate::CoreError::Invalid {
                what: "byte array",
                reason: format!("expected length {}, but got {}", N, value.len()),
            })?;
        Ok(FixedBytes(arr))
    }
}

impl<const N: usize> Serialize for FixedBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedBytes<N> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(FixedBytesVisitor(PhantomData))
        } else {
            deserializer.deserialize_bytes(FixedBytesVisitor(PhantomData))
        }
    }
}

impl<const N: usize> std::fmt::Debug for FixedBytes<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FixedBytes<{}>{:02x?}", N, &self.0[..])
    }
}

impl<const N: usize> Default for FixedBytes<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

#[cfg(test)]
#[rustfmt::skip::macros(vec)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_bytes_debug_format() {
        let bytes: FixedBytes<3> = FixedBytes([10, 11, 12]);
        assert_eq!(format!("{:?}", bytes), "FixedBytes<3>[0a, 0b, 0c]");
    }

    #[test]
    fn test_fixed_bytes_serde() {
        let bytes: FixedBytes<4> = FixedBytes([0xde, 0xad, 0xbe, 0xef]);

        let mut actual_cbor: Vec<u8> = vec![];
        ciborium::into_writer(&bytes, &mut actual_cbor).unwrap();

        let expected_cbor: Vec<u8> = vec![
            0x44, // bstr(4)
              0xde, 0xad, 0xbe, 0xef,
        ];

        assert_eq!(actual_cbor, expected_cbor);

        let bytes_de: FixedBytes<4> = ciborium::from_reader(actual_cbor.as_slice()).unwrap();
        assert_eq!(bytes_de, bytes);

        let actual_json = serde_json::to_string(&bytes).unwrap();
        assert_eq!(actual_json, "\"3q2+7w==\"");

        let bytes_de: FixedBytes<4> = serde_json::from_str(&actual_json).unwrap();
        assert_eq!(bytes_de, bytes);
    }

    #[test]
    fn test_fixed_bytes_wrong_length() {
        let err = ciborium::from_reader::<FixedBytes<4>, _>([0x42, 0x01, 0x02].as_slice())
            .err()
            .unwrap()
            .to_string();

        assert_eq!(
            err,
            "Semantic(None, \"invalid byte array: expected length 4, but got 2\")"
        );
    }
}
