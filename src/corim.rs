// SPDX-License-Identifier: MIT

//! # Concise Reference Integrity Manifest (CoRIM)
//!
//! An unsigned CoRIM bundles one or more tags (CoMID, CoSWID or CoTS) with
//! optional metadata about the manifest itself. Signed CoRIMs wrap the
//! unsigned form in a COSE_Sign1 envelope, see [`crate::cose`].
//!
//! ## Data Model
//!
//! ```text
//! UnsignedCorim (tag 501 when used as a COSE payload)
//! ├── 0: id                  text or UUID
//! ├── 1: tags                [+ tagged CoMID / CoSWID / CoTS]
//! ├── 2: dependent-rims      [+ Locator]
//! ├── 3: profile             URI or OID
//! ├── 4: rim-validity        Validity
//! └── 5: entities            [+ CorimEntity]
//! ```
//!
//! Tags are carried as the encoded CBOR item, outer tag included. The first
//! three bytes of each item identify the tag format and are what
//! [`Tag::kind`] matches on.
//!
//! ## Example Usage
//!
//! ```rust
//! use corimkit::{
//!     corim::{TagKind, UnsignedCorim},
//!     CborCodec,
//! };
//!
//! let mut rim = UnsignedCorim::new("Corim-Unique-Identifier-01");
//! rim.add_coswid(&[0x44, 0xde, 0xad, 0xbe, 0xef]);
//!
//! let cbor = rim.to_cbor().unwrap();
//! let decoded = UnsignedCorim::from_cbor(&cbor).unwrap();
//! assert_eq!(decoded.tags[0].kind().unwrap(), TagKind::Coswid);
//! ```

use std::{fmt::Display, marker::PhantomData};

use chrono::{DateTime, Utc};
use ciborium::{tag::Required, Value as CborValue};
use serde::{
    de::{self, Visitor},
    ser::{self, SerializeMap},
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::{
    codec::{cbor_value_to_bytes, decode_item},
    comid::{Comid, TagId},
    macros::map_len,
    Bytes, CborCodec, ComidError, CorimError, Error, HashEntry, Oid, Result, Uri, Validate,
    URI_TAG,
};

/// CBOR tag of an unsigned CoRIM used as a COSE payload.
pub const UNSIGNED_CORIM_TAG: u64 = 501;
pub const COSWID_TAG: u64 = 505;
pub const COMID_TAG: u64 = 506;
pub const COTS_TAG: u64 = 508;

const OID_TAG: u64 = 111;
const EPOCH_TAG: u64 = 1;

/// Encoded prefix of [`UNSIGNED_CORIM_TAG`].
pub const UNSIGNED_CORIM_PREFIX: [u8; 3] = [0xd9, 0x01, 0xf5];

/// Formats of the tags a CoRIM may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagKind {
    Coswid,
    Comid,
    Cots,
}

impl TagKind {
    pub fn cbor_tag(self) -> u64 {
        match self {
            Self::Coswid => COSWID_TAG,
            Self::Comid => COMID_TAG,
            Self::Cots => COTS_TAG,
        }
    }

    /// Encoded CBOR tag header that starts every tag of this kind.
    pub fn prefix(self) -> [u8; 3] {
        match self {
            Self::Coswid => [0xd9, 0x01, 0xf9],
            Self::Comid => [0xd9, 0x01, 0xfa],
            Self::Cots => [0xd9, 0x01, 0xfc],
        }
    }

    /// Short name, also used as the suffix of extracted files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Coswid => "coswid",
            Self::Comid => "comid",
            Self::Cots => "cots",
        }
    }

    pub fn from_prefix(data: &[u8]) -> Option<Self> {
        match data {
            [0xd9, 0x01, 0xf9, ..] => Some(Self::Coswid),
            [0xd9, 0x01, 0xfa, ..] => Some(Self::Comid),
            [0xd9, 0x01, 0xfc, ..] => Some(Self::Cots),
            _ => None,
        }
    }
}

impl Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An embedded tag: a complete CBOR data item whose outer tag identifies
/// its format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag(Vec<u8>);

impl Tag {
    /// Prefixes the encoded `content` with the tag header of `kind`.
    pub fn new(kind: TagKind, content: &[u8]) -> Self {
        let mut data = kind.prefix().to_vec();
        data.extend_from_slice(content);
        Self(data)
    }

    /// Wraps an already tagged item.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn kind(&self) -> Result<TagKind> {
        TagKind::from_prefix(&self.0).ok_or_else(|| {
            let end = self.0.len().min(3);
            CorimError::UnknownTagPrefix(hex::encode(&self.0[..end])).into()
        })
    }

    /// The item without its three-byte tag header.
    pub fn content(&self) -> &[u8] {
        self.0.get(3..).unwrap_or_default()
    }

    /// Decodes and validates the CoMID carried by this tag.
    pub fn to_comid(&self) -> Result<Comid> {
        match self.kind()? {
            TagKind::Comid => Comid::from_cbor(self.content()),
            other => Err(Error::custom(format!("not a CoMID tag: {other}"))),
        }
    }
}

impl Validate for Tag {
    fn valid(&self) -> Result<()> {
        self.kind()?;
        if self.content().is_empty() {
            return Err(CorimError::EmptyTag.into());
        }
        Ok(())
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            Bytes::from(self.0.as_slice()).serialize(serializer)
        } else {
            let item: CborValue =
                ciborium::from_reader(self.0.as_slice()).map_err(ser::Error::custom)?;
            item.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            Bytes::deserialize(deserializer).map(|b| Tag(b.0))
        } else {
            let item = CborValue::deserialize(deserializer)?;
            cbor_value_to_bytes(&item)
                .map(Tag)
                .map_err(de::Error::custom)
        }
    }
}

/// Location of a CoRIM this one depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locator {
    pub href: Uri,
    pub thumbprint: Option<HashEntry>,
}

impl Locator {
    pub fn new(href: impl Into<Uri>) -> Self {
        Self {
            href: href.into(),
            thumbprint: None,
        }
    }

    pub fn with_thumbprint(mut self, thumbprint: HashEntry) -> Self {
        self.thumbprint = Some(thumbprint);
        self
    }
}

impl Validate for Locator {
    fn valid(&self) -> Result<()> {
        self.href
            .valid()
            .map_err(|e| Error::validation("href", e))?;
        if let Some(thumbprint) = &self.thumbprint {
            thumbprint
                .valid()
                .map_err(|e| Error::validation("thumbprint", e))?;
        }
        Ok(())
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(map_len!(self, 1, thumbprint)))?;

        if is_human_readable {
            map.serialize_entry("href", &self.href)?;
            if let Some(thumbprint) = &self.thumbprint {
                map.serialize_entry("thumbprint", thumbprint)?;
            }
        } else {
            map.serialize_entry(&0, &self.href)?;
            if let Some(thumbprint) = &self.thumbprint {
                map.serialize_entry(&1, thumbprint)?;
            }
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct LocatorVisitor {
            is_human_readable: bool,
            marker: PhantomData<Locator>,
        }

        impl<'de> Visitor<'de> for LocatorVisitor {
            type Value = Locator;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing a CoRIM locator")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut locator = Locator::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("href") => locator.href = map.next_value()?,
                            Some("thumbprint") => locator.thumbprint = Some(map.next_value()?),
                            Some(s) => {
                                return Err(de::Error::unknown_field(s, &["href", "thumbprint"]))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => locator.href = map.next_value()?,
                            Some(1) => locator.thumbprint = Some(map.next_value()?),
                            Some(n) => {
                                return Err(de::Error::unknown_field(
                                    n.to_string().as_str(),
                                    &["0", "1"],
                                ))
                            }
                            None => break,
                        }
                    }
                }

                Ok(locator)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(LocatorVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// The profile a CoRIM conforms to.
///
/// JSON carries both forms as strings; a dotted-decimal string is an OID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    Uri(Uri),
    Oid(Oid),
}

impl Profile {
    pub fn as_uri(&self) -> Option<&Uri> {
        match self {
            Self::Uri(uri) => Some(uri),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Self::Oid(oid) => Some(oid),
            _ => None,
        }
    }
}

impl From<&str> for Profile {
    fn from(value: &str) -> Self {
        match value.parse::<Oid>() {
            Ok(oid) => Self::Oid(oid),
            Err(_) => Self::Uri(Uri::from(value)),
        }
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uri(uri) => write!(f, "{uri}"),
            Self::Oid(oid) => write!(f, "{oid}"),
        }
    }
}

impl Validate for Profile {
    fn valid(&self) -> Result<()> {
        match self {
            Self::Uri(uri) => uri.valid(),
            Self::Oid(oid) => oid.valid(),
        }
    }
}

impl Serialize for Profile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            match self {
                Self::Uri(uri) => uri.serialize(serializer),
                Self::Oid(oid) => Required::<&Oid, OID_TAG>(oid).serialize(serializer),
            }
        }
    }
}

impl<'de> Deserialize<'de> for Profile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Ok(Profile::from(s.as_str()))
        } else {
            match CborValue::deserialize(deserializer)? {
                CborValue::Tag(URI_TAG, inner) => match *inner {
                    CborValue::Text(s) => Ok(Profile::Uri(Uri(s))),
                    _ => Err(de::Error::custom(CorimError::InvalidProfile(
                        "URI must be a text string".to_string(),
                    ))),
                },
                CborValue::Tag(OID_TAG, inner) => match *inner {
                    CborValue::Bytes(b) => Ok(Profile::Oid(Oid::from_der_value(b))),
                    _ => Err(de::Error::custom(CorimError::InvalidProfile(
                        "OID must be a byte string".to_string(),
                    ))),
                },
                other => Err(de::Error::custom(CorimError::InvalidProfile(format!(
                    "expected tag {URI_TAG} or {OID_TAG}, got {other:?}"
                )))),
            }
        }
    }
}

struct EpochTime(DateTime<Utc>);

impl Serialize for EpochTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            self.0.serialize(serializer)
        } else {
            Required::<i64, EPOCH_TAG>(self.0.timestamp()).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for EpochTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            DateTime::<Utc>::deserialize(deserializer).map(EpochTime)
        } else {
            let secs = Required::<i64, EPOCH_TAG>::deserialize(deserializer)?.0;
            DateTime::from_timestamp(secs, 0)
                .map(EpochTime)
                .ok_or_else(|| de::Error::custom(CorimError::InvalidTimestamp(secs)))
        }
    }
}

/// A validity period. Times are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: DateTime<Utc>,
}

impl Validity {
    pub fn new(not_before: Option<DateTime<Utc>>, not_after: DateTime<Utc>) -> Self {
        Self {
            not_before,
            not_after,
        }
    }

    /// Whether `at` falls within the period.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.not_before.map_or(true, |nb| nb <= at) && at <= self.not_after
    }
}

impl Validate for Validity {
    fn valid(&self) -> Result<()> {
        match self.not_before {
            Some(nb) if nb > self.not_after => Err(CorimError::InvalidValidity {
                not_before: nb.to_rfc3339(),
                not_after: self.not_after.to_rfc3339(),
            }
            .into()),
            _ => Ok(()),
        }
    }
}

impl Serialize for Validity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(map_len!(self, 1, not_before)))?;

        if is_human_readable {
            if let Some(nb) = self.not_before {
                map.serialize_entry("not-before", &EpochTime(nb))?;
            }
            map.serialize_entry("not-after", &EpochTime(self.not_after))?;
        } else {
            if let Some(nb) = self.not_before {
                map.serialize_entry(&0, &EpochTime(nb))?;
            }
            map.serialize_entry(&1, &EpochTime(self.not_after))?;
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for Validity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ValidityVisitor {
            is_human_readable: bool,
            marker: PhantomData<Validity>,
        }

        impl<'de> Visitor<'de> for ValidityVisitor {
            type Value = Validity;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing a validity period")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut not_before: Option<EpochTime> = None;
                let mut not_after: Option<EpochTime> = None;

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("not-before") => not_before = Some(map.next_value()?),
                            Some("not-after") => not_after = Some(map.next_value()?),
                            Some(s) => {
                                return Err(de::Error::unknown_field(
                                    s,
                                    &["not-before", "not-after"],
                                ))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => not_before = Some(map.next_value()?),
                            Some(1) => not_after = Some(map.next_value()?),
                            Some(n) => {
                                return Err(de::Error::unknown_field(
                                    n.to_string().as_str(),
                                    &["0", "1"],
                                ))
                            }
                            None => break,
                        }
                    }
                }

                let not_after = not_after.ok_or_else(|| de::Error::missing_field("not-after"))?;

                Ok(Validity {
                    not_before: not_before.map(|t| t.0),
                    not_after: not_after.0,
                })
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(ValidityVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// Role of an entity with respect to a CoRIM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CorimRole {
    ManifestCreator,
    ManifestSigner,
}

impl CorimRole {
    pub fn code(self) -> i64 {
        match self {
            Self::ManifestCreator => 1,
            Self::ManifestSigner => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ManifestCreator => "manifest-creator",
            Self::ManifestSigner => "manifest-signer",
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(Self::ManifestCreator),
            2 => Ok(Self::ManifestSigner),
            n => Err(CorimError::InvalidRole(n).into()),
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "manifest-creator" => Ok(Self::ManifestCreator),
            "manifest-signer" => Ok(Self::ManifestSigner),
            other => Err(CorimError::UnknownRole(other.to_string()).into()),
        }
    }
}

impl Display for CorimRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for CorimRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(self.name())
        } else {
            serializer.serialize_i64(self.code())
        }
    }
}

impl<'de> Deserialize<'de> for CorimRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let name = String::deserialize(deserializer)?;
            CorimRole::from_name(&name).map_err(de::Error::custom)
        } else {
            let code = i64::deserialize(deserializer)?;
            CorimRole::from_code(code).map_err(de::Error::custom)
        }
    }
}

/// An organization responsible for a CoRIM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorimEntity {
    pub name: String,
    pub regid: Option<Uri>,
    pub roles: Vec<CorimRole>,
}

impl CorimEntity {
    pub fn new(name: impl Into<String>, roles: impl IntoIterator<Item = CorimRole>) -> Self {
        Self {
            name: name.into(),
            regid: None,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn with_regid(mut self, regid: impl Into<Uri>) -> Self {
        self.regid = Some(regid.into());
        self
    }
}

impl Validate for CorimEntity {
    fn valid(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ComidError::EmptyEntityName.into());
        }
        if let Some(regid) = &self.regid {
            regid
                .valid()
                .map_err(|e| Error::validation("registration id", e))?;
        }
        if self.roles.is_empty() {
            return Err(ComidError::NoRoles.into());
        }
        Ok(())
    }
}

impl Serialize for CorimEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(map_len!(self, 2, regid)))?;

        if is_human_readable {
            map.serialize_entry("name", &self.name)?;
            if let Some(regid) = &self.regid {
                map.serialize_entry("regid", regid)?;
            }
            map.serialize_entry("roles", &self.roles)?;
        } else {
            map.serialize_entry(&0, &self.name)?;
            if let Some(regid) = &self.regid {
                map.serialize_entry(&1, regid)?;
            }
            map.serialize_entry(&2, &self.roles)?;
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for CorimEntity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct CorimEntityVisitor {
            is_human_readable: bool,
            marker: PhantomData<CorimEntity>,
        }

        impl<'de> Visitor<'de> for CorimEntityVisitor {
            type Value = CorimEntity;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing CoRIM entity fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut entity = CorimEntity::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("name") => entity.name = map.next_value()?,
                            Some("regid") => entity.regid = Some(map.next_value()?),
                            Some("roles") => entity.roles = map.next_value()?,
                            Some(s) => {
                                return Err(de::Error::unknown_field(
                                    s,
                                    &["name", "regid", "roles"],
                                ))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => entity.name = map.next_value()?,
                            Some(1) => entity.regid = Some(map.next_value()?),
                            Some(2) => entity.roles = map.next_value()?,
                            Some(n) => {
                                return Err(de::Error::unknown_field(
                                    n.to_string().as_str(),
                                    &["0", "1", "2"],
                                ))
                            }
                            None => break,
                        }
                    }
                }

                Ok(entity)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(CorimEntityVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// The party that signed a CoRIM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signer {
    pub name: String,
    pub uri: Option<Uri>,
}

impl Signer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<Uri>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}

impl Validate for Signer {
    fn valid(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CorimError::EmptySignerName.into());
        }
        if let Some(uri) = &self.uri {
            uri.valid().map_err(|e| Error::validation("signer uri", e))?;
        }
        Ok(())
    }
}

impl Serialize for Signer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(map_len!(self, 1, uri)))?;

        if is_human_readable {
            map.serialize_entry("name", &self.name)?;
            if let Some(uri) = &self.uri {
                map.serialize_entry("uri", uri)?;
            }
        } else {
            map.serialize_entry(&0, &self.name)?;
            if let Some(uri) = &self.uri {
                map.serialize_entry(&1, uri)?;
            }
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for Signer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SignerVisitor {
            is_human_readable: bool,
            marker: PhantomData<Signer>,
        }

        impl<'de> Visitor<'de> for SignerVisitor {
            type Value = Signer;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing signer fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut signer = Signer::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("name") => signer.name = map.next_value()?,
                            Some("uri") => signer.uri = Some(map.next_value()?),
                            Some(s) => return Err(de::Error::unknown_field(s, &["name", "uri"])),
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => signer.name = map.next_value()?,
                            Some(1) => signer.uri = Some(map.next_value()?),
                            Some(n) => {
                                return Err(de::Error::unknown_field(
                                    n.to_string().as_str(),
                                    &["0", "1"],
                                ))
                            }
                            None => break,
                        }
                    }
                }

                Ok(signer)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(SignerVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// Signing metadata carried in the protected header of a signed CoRIM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub signer: Signer,
    pub validity: Option<Validity>,
}

impl Meta {
    pub fn new(signer: Signer) -> Self {
        Self {
            signer,
            validity: None,
        }
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = Some(validity);
        self
    }
}

impl Validate for Meta {
    fn valid(&self) -> Result<()> {
        self.signer
            .valid()
            .map_err(|e| Error::validation("signer", e))?;
        if let Some(validity) = &self.validity {
            validity
                .valid()
                .map_err(|e| Error::validation("validity", e))?;
        }
        Ok(())
    }
}

impl Serialize for Meta {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(map_len!(self, 1, validity)))?;

        if is_human_readable {
            map.serialize_entry("signer", &self.signer)?;
            if let Some(validity) = &self.validity {
                map.serialize_entry("validity", validity)?;
            }
        } else {
            map.serialize_entry(&0, &self.signer)?;
            if let Some(validity) = &self.validity {
                map.serialize_entry(&1, validity)?;
            }
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for Meta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MetaVisitor {
            is_human_readable: bool,
            marker: PhantomData<Meta>,
        }

        impl<'de> Visitor<'de> for MetaVisitor {
            type Value = Meta;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing CoRIM meta")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut meta = Meta::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("signer") => meta.signer = map.next_value()?,
                            Some("validity") => meta.validity = Some(map.next_value()?),
                            Some(s) => {
                                return Err(de::Error::unknown_field(s, &["signer", "validity"]))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => meta.signer = map.next_value()?,
                            Some(1) => meta.validity = Some(map.next_value()?),
                            Some(n) => {
                                return Err(de::Error::unknown_field(
                                    n.to_string().as_str(),
                                    &["0", "1"],
                                ))
                            }
                            None => break,
                        }
                    }
                }

                Ok(meta)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(MetaVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// Identifier of a CoRIM: a text string or a UUID.
pub type CorimId = TagId;

/// An unsigned CoRIM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsignedCorim {
    pub id: CorimId,
    pub tags: Vec<Tag>,
    pub dependent_rims: Option<Vec<Locator>>,
    pub profile: Option<Profile>,
    pub validity: Option<Validity>,
    pub entities: Option<Vec<CorimEntity>>,
}

impl UnsignedCorim {
    pub fn new(id: impl Into<CorimId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Parses a JSON template. Templates usually carry no tags yet, so the
    /// result is not validated.
    pub fn from_json_template(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn with_profile(mut self, profile: impl Into<Profile>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = Some(validity);
        self
    }

    /// Validates and encodes `comid`, then appends it as a CoMID tag.
    pub fn add_comid(&mut self, comid: &Comid) -> Result<&mut Self> {
        let data = comid.to_cbor().map_err(|e| e.context("invalid CoMID"))?;
        self.tags.push(Tag::new(TagKind::Comid, &data));
        Ok(self)
    }

    /// Appends an encoded CoSWID.
    pub fn add_coswid(&mut self, data: &[u8]) -> &mut Self {
        self.tags.push(Tag::new(TagKind::Coswid, data));
        self
    }

    /// Appends an encoded CoTS.
    pub fn add_cots(&mut self, data: &[u8]) -> &mut Self {
        self.tags.push(Tag::new(TagKind::Cots, data));
        self
    }

    pub fn add_dependent_rim(&mut self, locator: Locator) -> &mut Self {
        self.dependent_rims.get_or_insert_with(Vec::new).push(locator);
        self
    }

    pub fn add_entity(&mut self, entity: CorimEntity) -> &mut Self {
        self.entities.get_or_insert_with(Vec::new).push(entity);
        self
    }

    /// Kind and content of each tag, in order.
    pub fn extract_tags(&self) -> Result<Vec<(TagKind, &[u8])>> {
        self.tags
            .iter()
            .map(|tag| Ok((tag.kind()?, tag.content())))
            .collect()
    }

    /// Encodes as a COSE payload: tag 501 around the CoRIM map.
    pub fn to_tagged_cbor(&self) -> Result<Vec<u8>> {
        let mut data = UNSIGNED_CORIM_PREFIX.to_vec();
        data.extend(self.to_cbor()?);
        Ok(data)
    }

    /// Decodes a tag-501 payload without validating it.
    pub(crate) fn decode_tagged(data: &[u8]) -> Result<Self> {
        match data {
            [0xd9, 0x01, 0xf5, rest @ ..] => decode_item(rest),
            _ => Err(CorimError::MissingCorimTag.into()),
        }
    }

    pub fn from_tagged_cbor(data: &[u8]) -> Result<Self> {
        let rim = Self::decode_tagged(data)?;
        rim.valid()?;
        Ok(rim)
    }
}

fn valid_list<T: Validate>(list: &Option<Vec<T>>, field: &str, item: &str) -> Result<()> {
    for (i, v) in list.iter().flatten().enumerate() {
        v.valid()
            .map_err(|e| Error::validation(field, e.context(format!("{item} at index {i}"))))?;
    }
    Ok(())
}

impl Validate for UnsignedCorim {
    fn valid(&self) -> Result<()> {
        match &self.id {
            TagId::Text(s) if s.is_empty() => return Err(CorimError::EmptyId.into()),
            id => id.valid().map_err(|e| Error::validation("id", e))?,
        }

        if self.tags.is_empty() {
            return Err(Error::validation("tags", CorimError::NoTags));
        }
        for (i, tag) in self.tags.iter().enumerate() {
            tag.valid()
                .map_err(|e| Error::validation("tags", e.context(format!("tag at index {i}"))))?;
        }

        valid_list(&self.dependent_rims, "dependent-rims", "locator")?;

        if let Some(profile) = &self.profile {
            profile
                .valid()
                .map_err(|e| Error::validation("profile", e))?;
        }
        if let Some(validity) = &self.validity {
            validity
                .valid()
                .map_err(|e| Error::validation("validity", e))?;
        }

        valid_list(&self.entities, "entities", "entity")
    }
}

impl Serialize for UnsignedCorim {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let len = map_len!(self, 2, dependent_rims, profile, validity, entities);
        let mut map = serializer.serialize_map(Some(len))?;

        if is_human_readable {
            map.serialize_entry("corim-id", &self.id)?;
            map.serialize_entry("tags", &self.tags)?;
            if let Some(rims) = &self.dependent_rims {
                map.serialize_entry("dependent-rims", rims)?;
            }
            if let Some(profile) = &self.profile {
                map.serialize_entry("profile", profile)?;
            }
            if let Some(validity) = &self.validity {
                map.serialize_entry("validity", validity)?;
            }
            if let Some(entities) = &self.entities {
                map.serialize_entry("entities", entities)?;
            }
        } else {
            map.serialize_entry(&0, &self.id)?;
            map.serialize_entry(&1, &self.tags)?;
            if let Some(rims) = &self.dependent_rims {
                map.serialize_entry(&2, rims)?;
            }
            if let Some(profile) = &self.profile {
                map.serialize_entry(&3, profile)?;
            }
            if let Some(validity) = &self.validity {
                map.serialize_entry(&4, validity)?;
            }
            if let Some(entities) = &self.entities {
                map.serialize_entry(&5, entities)?;
            }
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for UnsignedCorim {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct UnsignedCorimVisitor {
            is_human_readable: bool,
            marker: PhantomData<UnsignedCorim>,
        }

        impl<'de> Visitor<'de> for UnsignedCorimVisitor {
            type Value = UnsignedCorim;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing unsigned CoRIM fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut rim = UnsignedCorim::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("corim-id") => rim.id = map.next_value()?,
                            Some("tags") => rim.tags = map.next_value()?,
                            Some("dependent-rims") => rim.dependent_rims = Some(map.next_value()?),
                            Some("profile") => rim.profile = Some(map.next_value()?),
                            Some("validity") => rim.validity = Some(map.next_value()?),
                            Some("entities") => rim.entities = Some(map.next_value()?),
                            Some(s) => {
                                return Err(de::Error::unknown_field(
                                    s,
                                    &[
                                        "corim-id",
                                        "tags",
                                        "dependent-rims",
                                        "profile",
                                        "validity",
                                        "entities",
                                    ],
                                ))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => rim.id = map.next_value()?,
                            Some(1) => rim.tags = map.next_value()?,
                            Some(2) => rim.dependent_rims = Some(map.next_value()?),
                            Some(3) => rim.profile = Some(map.next_value()?),
                            Some(4) => rim.validity = Some(map.next_value()?),
                            Some(5) => rim.entities = Some(map.next_value()?),
                            Some(n) => {
                                return Err(de::Error::unknown_field(
                                    n.to_string().as_str(),
                                    &["0", "1", "2", "3", "4", "5"],
                                ))
                            }
                            None => break,
                        }
                    }
                }

                Ok(rim)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(UnsignedCorimVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}
