// SPDX-License-Identifier: MIT

//! Shared encode/decode entry points.
//!
//! Every document type implements [`Validate`]. The blanket [`CborCodec`] and
//! [`JsonCodec`] traits then provide `to_cbor`/`from_cbor` and
//! `to_json`/`from_json`, which run validation before encoding and after
//! decoding, so that malformed trees never reach the wire.
//!
//! Decoding additionally rejects indefinite-length CBOR items.

use ciborium::Value as CborValue;
use serde::{de::DeserializeOwned, Serialize};

use crate::{Error, Result};

/// Types that can check their own well-formedness.
pub trait Validate {
    fn valid(&self) -> Result<()>;
}

/// CBOR encoding gated by [`Validate`].
pub trait CborCodec: Validate + Serialize + DeserializeOwned + Sized {
    /// Validates `self`, then encodes it to CBOR using definite lengths.
    fn to_cbor(&self) -> Result<Vec<u8>> {
        self.valid()?;
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    /// Decodes a single CBOR item, then validates it. Bytes following the
    /// item are an error.
    fn from_cbor(data: &[u8]) -> Result<Self> {
        let value: Self = decode_item(data)?;
        value.valid()?;
        Ok(value)
    }
}

impl<T: Validate + Serialize + DeserializeOwned> CborCodec for T {}

/// JSON encoding gated by [`Validate`].
pub trait JsonCodec: Validate + Serialize + DeserializeOwned + Sized {
    fn to_json(&self) -> Result<String> {
        self.valid()?;
        Ok(serde_json::to_string(self)?)
    }

    fn to_json_pretty(&self) -> Result<String> {
        self.valid()?;
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn from_json(data: &str) -> Result<Self> {
        let value: Self = serde_json::from_str(data)?;
        value.valid()?;
        Ok(value)
    }
}

impl<T: Validate + Serialize + DeserializeOwned> JsonCodec for T {}

/// Decodes exactly one definite-length CBOR item from `data`, without
/// validating it.
pub(crate) fn decode_item<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    reject_indefinite(data)?;
    let mut rest = data;
    let value: T = ciborium::from_reader(&mut rest)?;
    if !rest.is_empty() {
        return Err(Error::encoding(format!(
            "{} trailing bytes after CBOR item",
            rest.len()
        )));
    }
    Ok(value)
}

/// Serializes `value` through the binary (non human-readable) serializer and
/// returns the resulting CBOR data item.
pub(crate) fn to_cbor_value<T: Serialize + ?Sized>(value: &T) -> Result<CborValue> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(ciborium::from_reader(buf.as_slice())?)
}

/// Inverse of [`to_cbor_value`].
pub(crate) fn from_cbor_value<T: DeserializeOwned>(value: &CborValue) -> Result<T> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(ciborium::from_reader(buf.as_slice())?)
}

pub(crate) fn cbor_value_to_bytes(value: &CborValue) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Hex rendering of a CBOR item, used in diagnostics.
pub(crate) fn cbor_hex(value: &CborValue) -> String {
    cbor_value_to_bytes(value)
        .map(hex::encode)
        .unwrap_or_else(|_| String::from("<unencodable>"))
}

const MAX_DEPTH: usize = 128;

/// Walks the item headers in `data` and fails on the first indefinite-length
/// string, array or map.
pub fn reject_indefinite(data: &[u8]) -> Result<()> {
    let mut pos = 0;
    scan_item(data, &mut pos, 0)
}

fn truncated() -> Error {
    Error::encoding("truncated CBOR item")
}

fn read_argument(data: &[u8], pos: &mut usize, info: u8) -> Result<u64> {
    let width = match info {
        0..=23 => return Ok(info as u64),
        24 => 1,
        25 => 2,
        26 => 4,
        27 => 8,
        _ => return Err(Error::encoding(format!("invalid CBOR additional info {info}"))),
    };
    let end = pos.checked_add(width).ok_or_else(truncated)?;
    let bytes = data.get(*pos..end).ok_or_else(truncated)?;
    *pos = end;
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

fn scan_item(data: &[u8], pos: &mut usize, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::encoding("CBOR nesting too deep"));
    }

    let initial = *data.get(*pos).ok_or_else(truncated)?;
    *pos += 1;
    let major = initial >> 5;
    let info = initial & 0x1f;

    if info == 31 && (2..=5).contains(&major) {
        return Err(Error::encoding("indefinite-length CBOR items are not allowed"));
    }

    match major {
        0 | 1 => {
            read_argument(data, pos, info)?;
        }
        2 | 3 => {
            let len = read_argument(data, pos, info)?;
            let len = usize::try_from(len).map_err(|_| truncated())?;
            let end = pos.checked_add(len).ok_or_else(truncated)?;
            if end > data.len() {
                return Err(truncated());
            }
            *pos = end;
        }
        4 => {
            let count = read_argument(data, pos, info)?;
            for _ in 0..count {
                scan_item(data, pos, depth + 1)?;
            }
        }
        5 => {
            let count = read_argument(data, pos, info)?;
            for _ in 0..count {
                scan_item(data, pos, depth + 1)?;
                scan_item(data, pos, depth + 1)?;
            }
        }
        6 => {
            read_argument(data, pos, info)?;
            scan_item(data, pos, depth + 1)?;
        }
        _ => {
            if info != 31 {
                read_argument(data, pos, info)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[rustfmt::skip::macros(vec)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_indefinite() {
        let definite: Vec<u8> = vec![
            0xa1, // map(1)
              0x00, // key: 0
              0xd8, 0x25, // tag(37)
                0x82, // array(2)
                  0x41, 0x01, // bstr(1)
                  0x61, 0x61, // tstr(1)
        ];
        reject_indefinite(&definite).unwrap();

        let indefinite: Vec<u8> = vec![
            0xbf, // map(indef)
              0x00,
              0x01,
            0xff,
        ];
        let err = reject_indefinite(&indefinite).err().unwrap();
        assert_eq!(err.to_string(), "indefinite-length CBOR items are not allowed");

        let truncated: Vec<u8> = vec![0x82, 0x01];
        let err = reject_indefinite(&truncated).err().unwrap();
        assert_eq!(err.to_string(), "truncated CBOR item");
    }

    #[test]
    fn test_cbor_value_helpers() {
        let value = to_cbor_value(&(1u8, "a")).unwrap();
        assert_eq!(
            value,
            CborValue::Array(vec![CborValue::Integer(1.into()), CborValue::Text("a".into())])
        );
        assert_eq!(cbor_hex(&value), "82016161");

        let back: (u8, String) = from_cbor_value(&value).unwrap();
        assert_eq!(back, (1, "a".to_string()));
    }
}
