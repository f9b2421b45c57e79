// SPDX-License-Identifier: MIT

//! Integrity registers (PCRs and similar), keyed by integer or string index.
//!
//! In CBOR the registers are a native map whose keys may mix unsigned
//! integers and text strings. JSON object keys are always strings, so each
//! entry also records the key type:
//!
//! ```text
//! {"0": {"key-type": "uint", "value": ["sha-256;..."]}}
//! ```

use std::{collections::BTreeMap, fmt::Display, marker::PhantomData};

use derive_more::{Deref, DerefMut, From};
use serde::{
    de::{self, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::{CoreError, Digests, HashEntry, Result, TriplesError, Validate};

/// Index of an integrity register.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterIndex {
    Uint(u64),
    Text(String),
}

impl RegisterIndex {
    fn key_type(&self) -> &'static str {
        match self {
            Self::Uint(_) => "uint",
            Self::Text(_) => "text",
        }
    }
}

impl From<u64> for RegisterIndex {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<&str> for RegisterIndex {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RegisterIndex {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl Display for RegisterIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uint(u) => write!(f, "{u}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for RegisterIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Uint(u) => serializer.serialize_u64(*u),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for RegisterIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RegisterIndexVisitor;

        impl Visitor<'_> for RegisterIndexVisitor {
            type Value = RegisterIndex;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an unsigned integer or a text string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                Ok(RegisterIndex::Uint(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                u64::try_from(v)
                    .map(RegisterIndex::Uint)
                    .map_err(|_| E::custom(TriplesError::NegativeRegisterKey))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                Ok(RegisterIndex::Text(v.to_string()))
            }
        }

        deserializer.deserialize_any(RegisterIndexVisitor)
    }
}

#[derive(Serialize, Deserialize)]
struct TypedDigests {
    #[serde(rename = "key-type")]
    key_type: String,
    value: Digests,
}

/// A set of integrity registers.
#[derive(Debug, Clone, Default, PartialEq, Eq, From, Deref, DerefMut)]
pub struct IntegrityRegisters(pub BTreeMap<RegisterIndex, Digests>);

impl IntegrityRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` to the digests recorded for `index`.
    pub fn add_digest(&mut self, index: impl Into<RegisterIndex>, entry: HashEntry) -> &mut Self {
        self.0.entry(index.into()).or_default().add(entry);
        self
    }

    pub fn add_digests(&mut self, index: impl Into<RegisterIndex>, digests: Digests) -> &mut Self {
        self.0.entry(index.into()).or_default().extend(digests.0);
        self
    }

    /// Same indices, and set-equal digests for each index.
    pub fn equal(&self, other: &IntegrityRegisters) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .all(|(k, v)| other.0.get(k).is_some_and(|o| v.set_equal(o)))
    }

    /// Returns `true` if every register in `reference` is present in `self`
    /// with matching digests.
    pub fn matches(&self, reference: &IntegrityRegisters) -> bool {
        reference
            .0
            .iter()
            .all(|(k, r)| self.0.get(k).is_some_and(|c| c.matches(r)))
    }
}

impl Validate for IntegrityRegisters {
    fn valid(&self) -> Result<()> {
        for (index, digests) in &self.0 {
            digests
                .valid()
                .map_err(|e| e.context(format!("register {index}")))?;
        }
        Ok(())
    }
}

impl Serialize for IntegrityRegisters {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(self.0.len()))?;

        for (index, digests) in &self.0 {
            if is_human_readable {
                map.serialize_entry(
                    &index.to_string(),
                    &TypedDigests {
                        key_type: index.key_type().to_string(),
                        value: digests.clone(),
                    },
                )?;
            } else {
                map.serialize_entry(index, digests)?;
            }
        }

        map.end()
    }
}

fn typed_index(key: String, key_type: &str) -> Result<RegisterIndex> {
    match key_type {
        "uint" => {
            let n = key.parse::<i64>().map_err(|_| CoreError::Invalid {
                what: "register index",
                reason: format!("unable to convert key {key} to uint"),
            })?;
            u64::try_from(n)
                .map(RegisterIndex::Uint)
                .map_err(|_| TriplesError::NegativeRegisterKey.into())
        }
        "text" => Ok(RegisterIndex::Text(key)),
        other => Err(TriplesError::RegisterKeyType(other.to_string()).into()),
    }
}

impl<'de> Deserialize<'de> for IntegrityRegisters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct IntegrityRegistersVisitor {
            is_human_readable: bool,
            marker: PhantomData<IntegrityRegisters>,
        }

        impl<'de> Visitor<'de> for IntegrityRegistersVisitor {
            type Value = IntegrityRegisters;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map of register indices to digests")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut registers = IntegrityRegisters::default();

                if self.is_human_readable {
                    while let Some(key) = map.next_key::<String>()? {
                        let typed: TypedDigests = map.next_value()?;
                        let index =
                            typed_index(key, &typed.key_type).map_err(de::Error::custom)?;
                        registers.0.insert(index, typed.value);
                    }
                } else {
                    while let Some(index) = map.next_key::<RegisterIndex>()? {
                        registers.0.insert(index, map.next_value()?);
                    }
                }

                Ok(registers)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(IntegrityRegistersVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

#[cfg(test)]
#[rustfmt::skip::macros(vec)]
mod tests {
    use super::*;
    use crate::{digest::HashAlgorithm, test::SerdeTestCase};

    fn entry(value: [u8; 4]) -> HashEntry {
        HashEntry::new(HashAlgorithm::Sha256_32, value)
    }

    #[test]
    fn test_integrity_registers_serde() {
        let mut registers = IntegrityRegisters::new();
        registers
            .add_digest(3u64, entry([0xde, 0xad, 0xbe, 0xef]))
            .add_digest("PCR-1", entry([0xde, 0xad, 0xbe, 0xef]));

        SerdeTestCase {
            value: registers,
            expected_json: concat!(
                r#"{"3":{"key-type":"uint","value":["sha-256-32;3q2+7w=="]},"#,
                r#""PCR-1":{"key-type":"text","value":["sha-256-32;3q2+7w=="]}}"#,
            ),
            expected_cbor: vec![
                0xa2, // map(2)
                  0x03, // key: 3
                  0x81, // array(1)
                    0x82, // array(2)
                      0x06, // sha-256-32
                      0x44, // bstr(4)
                        0xde, 0xad, 0xbe, 0xef,
                  0x65, // key: tstr(5)
                    0x50, 0x43, 0x52, 0x2d, 0x31, // "PCR-1"
                  0x81, // array(1)
                    0x82, // array(2)
                      0x06, // sha-256-32
                      0x44, // bstr(4)
                        0xde, 0xad, 0xbe, 0xef,
            ],
        }
        .run();
    }

    #[test]
    fn test_integrity_registers_json_key_errors() {
        let err = serde_json::from_str::<IntegrityRegisters>(
            r#"{"-1":{"key-type":"uint","value":["sha-256-32;3q2+7w=="]}}"#,
        )
        .err()
        .unwrap()
        .to_string();
        assert!(err.starts_with("invalid negative integer key"), "{err}");

        let err = serde_json::from_str::<IntegrityRegisters>(
            r#"{"0":{"key-type":"float","value":["sha-256-32;3q2+7w=="]}}"#,
        )
        .err()
        .unwrap()
        .to_string();
        assert!(err.starts_with("unexpected key type for index: float"), "{err}");
    }

    #[test]
    fn test_integrity_registers_compare() {
        let mut claim = IntegrityRegisters::new();
        claim
            .add_digest(0u64, entry([1, 1, 1, 1]))
            .add_digest(0u64, entry([2, 2, 2, 2]))
            .add_digest(1u64, entry([3, 3, 3, 3]));

        let mut reference = IntegrityRegisters::new();
        reference.add_digest(0u64, entry([2, 2, 2, 2]));

        assert!(claim.matches(&reference));
        assert!(!reference.matches(&claim));
        assert!(!claim.equal(&reference));

        let mut reordered = IntegrityRegisters::new();
        reordered
            .add_digest(1u64, entry([3, 3, 3, 3]))
            .add_digest(0u64, entry([2, 2, 2, 2]))
            .add_digest(0u64, entry([1, 1, 1, 1]));
        assert!(claim.equal(&reordered));
        assert_ne!(claim, reordered);

        let mut bad = IntegrityRegisters::new();
        bad.add_digest("pcr", HashEntry::new(HashAlgorithm::Sha256, vec![0u8; 4]));
        assert_eq!(
            bad.valid().err().unwrap().to_string(),
            "register pcr: digest at index 0: length mismatch for hash algorithm sha-256: \
             want 32 bytes, got 4"
        );
    }
}
