// SPDX-License-Identifier: MIT

//! Primitive values shared by CoMID and CoRIM documents.
//!
//! Each type carries its own CBOR and JSON representation:
//!
//! | Type | CBOR | JSON |
//! |---|---|---|
//! | [`Bytes`] / [`TaggedBytes`] | bstr | base64 |
//! | [`Uuid`] | bstr(16) | canonical 8-4-4-4-12 string |
//! | [`Oid`] | bstr (BER value octets) | dotted decimal |
//! | [`Ueid`] | bstr | base64 |
//! | [`MacAddr`] | bstr | colon separated hex |
//! | [`IpAddr`] | bstr | dotted quad or RFC 5952 |
//! | [`Uri`] | tag 32 over tstr | string |
//!
//! CBOR tags that discriminate type-choice variants (for example tag 37 on a
//! UUID class id) are applied by the [`choice`](crate::choice) framework, not
//! here.

use std::{fmt::Display, marker::PhantomData, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ciborium::tag::Required;
use derive_more::{AsRef, Deref, DerefMut, From};
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::{choice::ChoiceValue, CoreError, FixedBytes, Result, Validate};

/// CBOR tag for URIs (RFC 8949)
pub const URI_TAG: u64 = 32;

struct BytesVisitor<'de>(PhantomData<&'de ()>);

impl<'de> Visitor<'de> for BytesVisitor<'de> {
    type Value = Vec<u8>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a byte string or base64 string")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        STANDARD
            .decode(v)
            .map_err(|e| E::custom(CoreError::Base64(e.to_string())))
    }
}

/// An opaque byte string, base64 encoded in JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, AsRef, Deref, DerefMut)]
pub struct Bytes(pub Vec<u8>);

impl From<&[u8]> for Bytes {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Bytes {
    fn from(value: [u8; N]) -> Self {
        Self(value.to_vec())
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(&self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(BytesVisitor(PhantomData)).map(Bytes)
        } else {
            deserializer
                .deserialize_byte_buf(BytesVisitor(PhantomData))
                .map(Bytes)
        }
    }
}

impl Validate for Bytes {
    fn valid(&self) -> Result<()> {
        Ok(())
    }
}

/// Opaque bytes used as a class, instance or group identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaggedBytes(pub Bytes);

impl FromStr for TaggedBytes {
    type Err = CoreError;

    /// Parses the base64 form.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        STANDARD
            .decode(s)
            .map(|b| TaggedBytes(Bytes(b)))
            .map_err(|e| CoreError::Base64(e.to_string()))
    }
}

impl Validate for TaggedBytes {
    fn valid(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(CoreError::Empty("bytes").into());
        }
        Ok(())
    }
}

impl ChoiceValue for TaggedBytes {
    fn type_name(&self) -> &'static str {
        "bytes"
    }
}

/// An RFC 4122 UUID.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct Uuid(pub FixedBytes<16>);

impl Uuid {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0 .0
    }

    /// The variant encoded in the top bits of octet 8.
    pub fn variant(&self) -> &'static str {
        let octet = self.0[8];
        if octet & 0x80 == 0 {
            "Reserved"
        } else if octet & 0xc0 == 0x80 {
            "RFC4122"
        } else if octet & 0xe0 == 0xc0 {
            "Microsoft"
        } else {
            "Future"
        }
    }
}

impl From<[u8; 16]> for Uuid {
    fn from(value: [u8; 16]) -> Self {
        Self(FixedBytes(value))
    }
}

impl TryFrom<&[u8]> for Uuid {
    type Error = CoreError;

    fn try_from(value: &[u8]) -> std::result::Result<Self, Self::Error> {
        Ok(Self(FixedBytes::try_from(value)?))
    }
}

impl FromStr for Uuid {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidUuid(s.to_string());

        let hyphens_ok = s.len() == 36
            && s.char_indices()
                .all(|(i, c)| matches!(i, 8 | 13 | 18 | 23) == (c == '-'));
        if !hyphens_ok {
            return Err(invalid());
        }

        let digits: String = s.chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(digits).map_err(|_| invalid())?;
        Uuid::try_from(bytes.as_slice()).map_err(|_| invalid())
    }
}

impl Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let h = hex::encode(self.as_bytes());
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &h[0..8],
            &h[8..12],
            &h[12..16],
            &h[16..20],
            &h[20..32]
        )
    }
}

impl std::fmt::Debug for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Uuid({self})")
    }
}

impl Serialize for Uuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(self.as_bytes())
        }
    }
}

impl<'de> Deserialize<'de> for Uuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer)?
                .parse()
                .map_err(de::Error::custom)
        } else {
            FixedBytes::<16>::deserialize(deserializer).map(Uuid)
        }
    }
}

impl Validate for Uuid {
    fn valid(&self) -> Result<()> {
        match self.variant() {
            "RFC4122" => Ok(()),
            other => Err(CoreError::UuidVariant(other.to_string()).into()),
        }
    }
}

impl ChoiceValue for Uuid {
    fn type_name(&self) -> &'static str {
        "uuid"
    }
}

/// An absolute object identifier, stored as its BER value octets.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(Vec<u8>);

impl Oid {
    /// Encodes `arcs` as BER value octets.
    pub fn from_arcs(arcs: &[u64]) -> Result<Self> {
        if arcs.len() < 3 {
            return Err(CoreError::OidArcs(arcs.len()).into());
        }
        if arcs[0] > 2 {
            return Err(CoreError::OidFirstArc(arcs[0]).into());
        }
        if arcs[0] < 2 && arcs[1] > 39 {
            return Err(CoreError::OidSecondArc(arcs[1]).into());
        }

        let first = arcs[0]
            .checked_mul(40)
            .and_then(|v| v.checked_add(arcs[1]))
            .ok_or_else(|| CoreError::OidArc(arcs[1].to_string()))?;

        let mut out = Vec::new();
        push_base128(&mut out, first);
        for arc in &arcs[2..] {
            push_base128(&mut out, *arc);
        }

        Ok(Self(out))
    }

    /// Wraps already encoded value octets. Use [`Validate::valid`] to check them.
    pub fn from_der_value(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decodes the value octets back into arcs.
    pub fn arcs(&self) -> Result<Vec<u64>> {
        if self.0.is_empty() {
            return Err(CoreError::MalformedOid.into());
        }

        let mut subids = Vec::new();
        let mut acc: u64 = 0;
        let mut in_progress = false;

        for b in &self.0 {
            if !in_progress && *b == 0x80 {
                // non-minimal encoding
                return Err(CoreError::MalformedOid.into());
            }
            if acc > (u64::MAX >> 7) {
                return Err(CoreError::MalformedOid.into());
            }
            acc = (acc << 7) | (b & 0x7f) as u64;
            if b & 0x80 == 0 {
                subids.push(acc);
                acc = 0;
                in_progress = false;
            } else {
                in_progress = true;
            }
        }

        if in_progress {
            return Err(CoreError::MalformedOid.into());
        }

        let first = subids[0];
        let mut arcs = match first {
            0..=39 => vec![0, first],
            40..=79 => vec![1, first - 40],
            _ => vec![2, first - 80],
        };
        arcs.extend_from_slice(&subids[1..]);

        Ok(arcs)
    }
}

fn push_base128(out: &mut Vec<u8>, mut n: u64) {
    let mut groups = vec![(n & 0x7f) as u8];
    n >>= 7;
    while n > 0 {
        groups.push((n & 0x7f) as u8 | 0x80);
        n >>= 7;
    }
    out.extend(groups.iter().rev());
}

impl FromStr for Oid {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() || s.starts_with('.') {
            return Err(CoreError::OidNotAbsolute.into());
        }

        let arcs = s
            .split('.')
            .map(|arc| {
                arc.parse::<u64>()
                    .map_err(|_| CoreError::OidArc(arc.to_string()))
            })
            .collect::<std::result::Result<Vec<u64>, CoreError>>()?;

        Oid::from_arcs(&arcs)
    }
}

impl Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.arcs() {
            Ok(arcs) => {
                let parts: Vec<String> = arcs.iter().map(u64::to_string).collect();
                f.write_str(&parts.join("."))
            }
            Err(_) => write!(f, "<malformed OID {}>", hex::encode(&self.0)),
        }
    }
}

impl std::fmt::Debug for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Oid({self})")
    }
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let arcs = self.arcs().map_err(serde::ser::Error::custom)?;
            let parts: Vec<String> = arcs.iter().map(u64::to_string).collect();
            serializer.serialize_str(&parts.join("."))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer)?
                .parse()
                .map_err(de::Error::custom)
        } else {
            Bytes::deserialize(deserializer).map(|b| Oid(b.0))
        }
    }
}

impl Validate for Oid {
    fn valid(&self) -> Result<()> {
        let arcs = self.arcs()?;
        if arcs.len() < 3 {
            return Err(CoreError::OidArcs(arcs.len()).into());
        }
        Ok(())
    }
}

impl ChoiceValue for Oid {
    fn type_name(&self) -> &'static str {
        "oid"
    }
}

/// Universal Entity ID (EAT).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ueid(pub Bytes);

impl Ueid {
    pub const TYPE_RAND: u8 = 0x01;
    pub const TYPE_EUI: u8 = 0x02;
    pub const TYPE_IMEI: u8 = 0x03;
}

impl From<Vec<u8>> for Ueid {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes(value))
    }
}

impl Validate for Ueid {
    fn valid(&self) -> Result<()> {
        let len = self.0.len();
        let (kind, ok) = match self.0.first() {
            None => return Err(CoreError::EmptyUeid.into()),
            Some(&Self::TYPE_RAND) => ("RAND", (17..=33).contains(&len)),
            Some(&Self::TYPE_EUI) => ("EUI", len == 7 || len == 9),
            Some(&Self::TYPE_IMEI) => ("IMEI", len == 15),
            Some(other) => return Err(CoreError::UeidType(*other).into()),
        };

        if !ok {
            return Err(CoreError::UeidLength { kind, len }.into());
        }
        Ok(())
    }
}

impl ChoiceValue for Ueid {
    fn type_name(&self) -> &'static str {
        "ueid"
    }
}

/// An EUI-48 or EUI-64 hardware address.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct MacAddr(pub Vec<u8>);

impl FromStr for MacAddr {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let bytes = s
            .split(sep)
            .map(|part| {
                if part.len() != 2 {
                    return Err(CoreError::InvalidMacAddr(s.to_string()));
                }
                u8::from_str_radix(part, 16).map_err(|_| CoreError::InvalidMacAddr(s.to_string()))
            })
            .collect::<std::result::Result<Vec<u8>, CoreError>>()?;

        let mac = MacAddr(bytes);
        if mac.0.len() != 6 && mac.0.len() != 8 {
            return Err(CoreError::MacAddrLength(mac.0.len()));
        }
        Ok(mac)
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{b:02x}")).collect();
        f.write_str(&parts.join(":"))
    }
}

impl std::fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer)?
                .parse()
                .map_err(de::Error::custom)
        } else {
            Bytes::deserialize(deserializer).map(|b| MacAddr(b.0))
        }
    }
}

impl Validate for MacAddr {
    fn valid(&self) -> Result<()> {
        match self.0.len() {
            6 | 8 => Ok(()),
            n => Err(CoreError::MacAddrLength(n).into()),
        }
    }
}

/// An IPv4 or IPv6 address in network byte order.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct IpAddr(pub Vec<u8>);

impl IpAddr {
    fn to_std(&self) -> Result<std::net::IpAddr> {
        if let Ok(v4) = <[u8; 4]>::try_from(self.0.as_slice()) {
            return Ok(std::net::IpAddr::from(v4));
        }
        if let Ok(v6) = <[u8; 16]>::try_from(self.0.as_slice()) {
            return Ok(std::net::IpAddr::from(v6));
        }
        Err(CoreError::IpAddrLength(self.0.len()).into())
    }
}

impl From<std::net::IpAddr> for IpAddr {
    fn from(value: std::net::IpAddr) -> Self {
        match value {
            std::net::IpAddr::V4(v4) => Self(v4.octets().to_vec()),
            std::net::IpAddr::V6(v6) => Self(v6.octets().to_vec()),
        }
    }
}

impl FromStr for IpAddr {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<std::net::IpAddr>()
            .map(IpAddr::from)
            .map_err(|_| CoreError::InvalidIpAddr(s.to_string()))
    }
}

impl Display for IpAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_std() {
            Ok(ip) => write!(f, "{ip}"),
            Err(_) => write!(f, "<invalid IP {}>", hex::encode(&self.0)),
        }
    }
}

impl std::fmt::Debug for IpAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IpAddr({self})")
    }
}

impl Serialize for IpAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let ip = self.to_std().map_err(serde::ser::Error::custom)?;
            serializer.serialize_str(&ip.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for IpAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer)?
                .parse()
                .map_err(de::Error::custom)
        } else {
            Bytes::deserialize(deserializer).map(|b| IpAddr(b.0))
        }
    }
}

impl Validate for IpAddr {
    fn valid(&self) -> Result<()> {
        self.to_std().map(|_| ())
    }
}

/// An absolute URI, wrapped in CBOR tag 32.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, AsRef, Deref)]
pub struct Uri(pub String);

impl From<&str> for Uri {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns `true` if `s` starts with an RFC 3986 scheme followed by `:`.
pub(crate) fn has_uri_scheme(s: &str) -> bool {
    match s.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

impl Serialize for Uri {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0)
        } else {
            Required::<&str, URI_TAG>(self.0.as_str()).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer).map(Uri)
        } else {
            Required::<String, URI_TAG>::deserialize(deserializer).map(|t| Uri(t.0))
        }
    }
}

impl Validate for Uri {
    fn valid(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(CoreError::EmptyUri.into());
        }
        if !has_uri_scheme(&self.0) {
            return Err(CoreError::UriNotAbsolute(self.0.clone()).into());
        }
        Ok(())
    }
}

/// A bare signed integer variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Int(pub i64);

impl Validate for Int {
    fn valid(&self) -> Result<()> {
        Ok(())
    }
}

impl ChoiceValue for Int {
    fn type_name(&self) -> &'static str {
        "int"
    }
}

/// A bare unsigned integer variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uint(pub u64);

impl Validate for Uint {
    fn valid(&self) -> Result<()> {
        Ok(())
    }
}

impl ChoiceValue for Uint {
    fn type_name(&self) -> &'static str {
        "uint"
    }
}
