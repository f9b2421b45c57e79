// SPDX-License-Identifier: MIT

//! Hash entries and digest sequences.
//!
//! A [`HashEntry`] is encoded as `[alg-id, digest]` in CBOR and as the string
//! `"<alg-name>;<base64-digest>"` in JSON, for example
//! `"sha-256;3q2+7w..."`. Algorithm identifiers come from the IANA
//! "Named Information Hash Algorithm" registry.

use std::{fmt::Display, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use derive_more::{Deref, DerefMut, From};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{Bytes, CoreError, Error, Result, Validate};

/// Hash algorithms from the Named Information registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u64)]
pub enum HashAlgorithm {
    Sha256 = 1,
    Sha256_128 = 2,
    Sha256_120 = 3,
    Sha256_96 = 4,
    Sha256_64 = 5,
    Sha256_32 = 6,
    Sha384 = 7,
    Sha512 = 8,
    Sha3_224 = 9,
    Sha3_256 = 10,
    Sha3_384 = 11,
    Sha3_512 = 12,
}

impl HashAlgorithm {
    const ALL: [HashAlgorithm; 12] = [
        Self::Sha256,
        Self::Sha256_128,
        Self::Sha256_120,
        Self::Sha256_96,
        Self::Sha256_64,
        Self::Sha256_32,
        Self::Sha384,
        Self::Sha512,
        Self::Sha3_224,
        Self::Sha3_256,
        Self::Sha3_384,
        Self::Sha3_512,
    ];

    pub fn id(self) -> u64 {
        self as u64
    }

    pub fn from_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.id() == id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha-256",
            Self::Sha256_128 => "sha-256-128",
            Self::Sha256_120 => "sha-256-120",
            Self::Sha256_96 => "sha-256-96",
            Self::Sha256_64 => "sha-256-64",
            Self::Sha256_32 => "sha-256-32",
            Self::Sha384 => "sha-384",
            Self::Sha512 => "sha-512",
            Self::Sha3_224 => "sha3-224",
            Self::Sha3_256 => "sha3-256",
            Self::Sha3_384 => "sha3-384",
            Self::Sha3_512 => "sha3-512",
        }
    }

    /// Digest length in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha256_128 => 16,
            Self::Sha256_120 => 15,
            Self::Sha256_96 => 12,
            Self::Sha256_64 => 8,
            Self::Sha256_32 => 4,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
            Self::Sha3_224 => 28,
            Self::Sha3_256 => 32,
            Self::Sha3_384 => 48,
            Self::Sha3_512 => 64,
        }
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A digest together with the identifier of the algorithm that produced it.
///
/// The algorithm is kept as a raw identifier so that entries using
/// unregistered algorithms survive decoding and are reported by
/// [`Validate::valid`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashEntry {
    pub alg_id: u64,
    pub value: Bytes,
}

impl HashEntry {
    pub fn new(alg: HashAlgorithm, value: impl Into<Vec<u8>>) -> Self {
        Self {
            alg_id: alg.id(),
            value: Bytes(value.into()),
        }
    }

    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        HashAlgorithm::from_id(self.alg_id)
    }
}

impl FromStr for HashEntry {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, b64) = s
            .split_once(';')
            .ok_or_else(|| CoreError::MalformedHashEntry(s.to_string()))?;

        let alg_id = match HashAlgorithm::from_name(name) {
            Some(alg) => alg.id(),
            None => name
                .parse::<u64>()
                .map_err(|_| CoreError::HashAlgorithmName(name.to_string()))?,
        };

        let value = STANDARD
            .decode(b64)
            .map_err(|e| CoreError::Base64(e.to_string()))?;

        Ok(Self {
            alg_id,
            value: Bytes(value),
        })
    }
}

impl Display for HashEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.algorithm() {
            Some(alg) => write!(f, "{};{}", alg.name(), STANDARD.encode(&self.value.0)),
            None => write!(f, "{};{}", self.alg_id, STANDARD.encode(&self.value.0)),
        }
    }
}

impl Serialize for HashEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            (self.alg_id, &self.value).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for HashEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer)?
                .parse()
                .map_err(de::Error::custom)
        } else {
            let (alg_id, value) = <(u64, Bytes)>::deserialize(deserializer)?;
            Ok(Self { alg_id, value })
        }
    }
}

impl Validate for HashEntry {
    fn valid(&self) -> Result<()> {
        let alg = self
            .algorithm()
            .ok_or(CoreError::HashAlgorithm(self.alg_id))?;

        if self.value.len() != alg.size() {
            return Err(CoreError::DigestLength {
                alg: alg.name(),
                want: alg.size(),
                got: self.value.len(),
            }
            .into());
        }

        Ok(())
    }
}

/// An ordered, non-empty sequence of [`HashEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Deref, DerefMut, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digests(pub Vec<HashEntry>);

impl Digests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: HashEntry) -> &mut Self {
        self.0.push(entry);
        self
    }

    /// Order-insensitive equality.
    pub fn set_equal(&self, other: &Digests) -> bool {
        self.0.iter().all(|d| other.0.contains(d)) && other.0.iter().all(|d| self.0.contains(d))
    }

    /// Returns `true` if every entry of `reference` has an entry in `self`
    /// with the same algorithm and value.
    pub fn matches(&self, reference: &Digests) -> bool {
        reference.0.iter().all(|r| {
            self.0
                .iter()
                .any(|c| c.alg_id == r.alg_id && c.value == r.value)
        })
    }
}

impl Validate for Digests {
    fn valid(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(CoreError::NoDigests.into());
        }

        for (i, entry) in self.0.iter().enumerate() {
            entry
                .valid()
                .map_err(|e| e.context(format!("digest at index {i}")))?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[rustfmt::skip::macros(vec)]
mod tests {
    use super::*;
    use crate::test::SerdeTestCase;

    #[test]
    fn test_hash_entry_serde() {
        SerdeTestCase {
            value: HashEntry::new(HashAlgorithm::Sha256_32, vec![0xde, 0xad, 0xbe, 0xef]),
            expected_json: "\"sha-256-32;3q2+7w==\"",
            expected_cbor: vec![
                0x82, // array(2)
                  0x06, // sha-256-32
                  0x44, // bstr(4)
                    0xde, 0xad, 0xbe, 0xef,
            ],
        }
        .run();
    }

    #[test]
    fn test_hash_entry_valid() {
        let entry = HashEntry::new(HashAlgorithm::Sha256, vec![0u8; 32]);
        entry.valid().unwrap();

        let short = HashEntry::new(HashAlgorithm::Sha384, vec![0u8; 32]);
        assert_eq!(
            short.valid().err().unwrap().to_string(),
            "length mismatch for hash algorithm sha-384: want 48 bytes, got 32"
        );

        let reserved = HashEntry {
            alg_id: 0,
            value: Bytes(vec![0u8; 32]),
        };
        assert_eq!(
            reserved.valid().err().unwrap().to_string(),
            "unknown hash algorithm 0"
        );
    }

    #[test]
    fn test_hash_entry_from_str() {
        let entry: HashEntry = "sha3-224;AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=="
            .parse()
            .unwrap();
        assert_eq!(entry.algorithm(), Some(HashAlgorithm::Sha3_224));
        entry.valid().unwrap();

        let err = "md5;AAAA".parse::<HashEntry>().err().unwrap();
        assert_eq!(err.to_string(), "unknown hash algorithm name md5");

        let err = "sha-256".parse::<HashEntry>().err().unwrap();
        assert_eq!(err.to_string(), "malformed hash entry: sha-256");
    }

    #[test]
    fn test_digests_matching() {
        let a = HashEntry::new(HashAlgorithm::Sha256_32, vec![1, 2, 3, 4]);
        let b = HashEntry::new(HashAlgorithm::Sha256_64, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let claim = Digests(vec![a.clone(), b.clone()]);
        let reference = Digests(vec![b.clone()]);

        assert!(claim.matches(&reference));
        assert!(!reference.matches(&claim));
        assert!(claim.set_equal(&Digests(vec![b, a])));

        assert_eq!(
            Digests::new().valid().err().unwrap().to_string(),
            "no digests"
        );
    }
}
