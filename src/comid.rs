// SPDX-License-Identifier: MIT

//! Concise Module Identifier (CoMID) tags.
//!
//! ```text
//! concise-mid-tag = {
//!   ? 0 => text                       ; language
//!   1 => tag-identity-map
//!   ? 2 => [ + comid-entity-map ]
//!   ? 3 => [ + linked-tag-map ]
//!   4 => triples-map
//!   * $$concise-mid-tag-extension
//! }
//! ```
//!
//! # Example
//!
//! ```rust
//! use corimkit::{
//!     comid::{Comid, Role, TagId},
//!     CborCodec,
//! };
//!
//! let mut comid = Comid::new(TagId::from("acme-tag"));
//! comid.add_entity("ACME Ltd.", None, vec![Role::TAG_CREATOR]).unwrap();
//!
//! // A CoMID needs at least one triple before it can be encoded.
//! assert!(comid.to_cbor().is_err());
//! ```
//!
//! Entity roles and linked-tag relations are open registries: besides the
//! built-in codes, applications may add their own with [`register_role`] and
//! [`register_rel`].

use std::{
    collections::BTreeMap,
    fmt::Display,
    marker::PhantomData,
    sync::{LazyLock, PoisonError, RwLock},
};

use ciborium::Value as CborValue;
use serde::{
    de::{self, Visitor},
    ser::{self, SerializeMap},
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value as JsonValue;

use crate::{
    extensions::{ExtensionPoint, Extensions, ExtensionsMap, Host},
    macros::map_len,
    triples::{CondEndorseSeriesTriple, KeyTriple, Triples, ValueTriple},
    ComidError, Error, Result, Uri, Uuid, Validate,
};

/// Bidirectional code/name table backing [`Role`] and [`Rel`].
struct Names {
    kind: &'static str,
    names: BTreeMap<i64, String>,
}

impl Names {
    fn new(kind: &'static str, builtins: &[(i64, &str)]) -> Self {
        Self {
            kind,
            names: builtins
                .iter()
                .map(|(code, name)| (*code, name.to_string()))
                .collect(),
        }
    }

    fn insert(&mut self, code: i64, name: &str) -> Result<()> {
        if self.names.contains_key(&code) {
            return Err(ComidError::CodeRegistered {
                kind: self.kind,
                code,
            }
            .into());
        }
        if self.code(name).is_some() {
            return Err(ComidError::NameRegistered {
                kind: self.kind,
                name: name.to_string(),
            }
            .into());
        }
        self.names.insert(code, name.to_string());
        Ok(())
    }

    fn name(&self, code: i64) -> Option<String> {
        self.names.get(&code).cloned()
    }

    fn code(&self, name: &str) -> Option<i64> {
        self.names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(code, _)| *code)
    }
}

static ROLES: LazyLock<RwLock<Names>> = LazyLock::new(|| {
    RwLock::new(Names::new(
        "role",
        &[(0, "tag-creator"), (1, "creator"), (2, "maintainer")],
    ))
});

static RELS: LazyLock<RwLock<Names>> = LazyLock::new(|| {
    RwLock::new(Names::new("rel", &[(0, "supplements"), (1, "replaces")]))
});

fn read(names: &'static RwLock<Names>) -> std::sync::RwLockReadGuard<'static, Names> {
    names.read().unwrap_or_else(PoisonError::into_inner)
}

/// Adds an entity role under `code` with JSON name `name`.
pub fn register_role(code: i64, name: &str) -> Result<()> {
    ROLES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(code, name)
}

/// Adds a linked-tag relation under `code` with JSON name `name`.
pub fn register_rel(code: i64, name: &str) -> Result<()> {
    RELS.write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(code, name)
}

/// The role an entity plays with respect to a CoMID. Unset until a code is
/// assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Role(Option<i64>);

impl Role {
    pub const TAG_CREATOR: Role = Role(Some(0));
    pub const CREATOR: Role = Role(Some(1));
    pub const MAINTAINER: Role = Role(Some(2));

    pub fn new() -> Self {
        Self(None)
    }

    pub fn set(&mut self, code: i64) {
        self.0 = Some(code);
    }

    pub fn get(&self) -> Option<i64> {
        self.0
    }

    /// Looks `name` up in the role registry.
    pub fn from_name(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(ComidError::EmptyRole.into());
        }
        read(&ROLES)
            .code(name)
            .map(|code| Self(Some(code)))
            .ok_or_else(|| ComidError::UnknownRole(name.to_string()).into())
    }

    pub fn name(&self) -> Option<String> {
        self.0.and_then(|code| read(&ROLES).name(code))
    }
}

impl From<i64> for Role {
    fn from(code: i64) -> Self {
        Self(Some(code))
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.0, self.name()) {
            (Some(_), Some(name)) => f.write_str(&name),
            (Some(code), None) => write!(f, "Role({code})"),
            (None, _) => f.write_str("unset"),
        }
    }
}

impl Validate for Role {
    fn valid(&self) -> Result<()> {
        match self.0 {
            Some(_) => Ok(()),
            None => Err(ComidError::RoleUnset.into()),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let code = self.0.ok_or_else(|| ser::Error::custom(ComidError::RoleUnset))?;
        if serializer.is_human_readable() {
            let name = self
                .name()
                .ok_or_else(|| ser::Error::custom(ComidError::UnknownRole(code.to_string())))?;
            serializer.serialize_str(&name)
        } else {
            serializer.serialize_i64(code)
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let name = String::deserialize(deserializer)?;
            Role::from_name(&name).map_err(de::Error::custom)
        } else {
            i64::deserialize(deserializer).map(Role::from)
        }
    }
}

/// Relation between a CoMID and the tag it links to. Unset until a code is
/// assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rel(Option<i64>);

impl Rel {
    pub const SUPPLEMENTS: Rel = Rel(Some(0));
    pub const REPLACES: Rel = Rel(Some(1));

    pub fn new() -> Self {
        Self(None)
    }

    pub fn set(&mut self, code: i64) {
        self.0 = Some(code);
    }

    pub fn get(&self) -> Option<i64> {
        self.0
    }

    pub fn from_name(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(ComidError::EmptyRel.into());
        }
        read(&RELS)
            .code(name)
            .map(|code| Self(Some(code)))
            .ok_or_else(|| ComidError::UnknownRel(name.to_string()).into())
    }

    pub fn name(&self) -> Option<String> {
        self.0.and_then(|code| read(&RELS).name(code))
    }
}

impl From<i64> for Rel {
    fn from(code: i64) -> Self {
        Self(Some(code))
    }
}

impl Display for Rel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.0, self.name()) {
            (Some(_), Some(name)) => f.write_str(&name),
            (Some(code), None) => write!(f, "rel({code})"),
            (None, _) => f.write_str("unset"),
        }
    }
}

impl Validate for Rel {
    fn valid(&self) -> Result<()> {
        match self.0 {
            Some(_) => Ok(()),
            None => Err(ComidError::RelUnset.into()),
        }
    }
}

impl Serialize for Rel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let code = self.0.ok_or_else(|| ser::Error::custom(ComidError::RelUnset))?;
        if serializer.is_human_readable() {
            let name = self
                .name()
                .ok_or_else(|| ser::Error::custom(ComidError::UnknownRel(code.to_string())))?;
            serializer.serialize_str(&name)
        } else {
            serializer.serialize_i64(code)
        }
    }
}

impl<'de> Deserialize<'de> for Rel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let name = String::deserialize(deserializer)?;
            Rel::from_name(&name).map_err(de::Error::custom)
        } else {
            i64::deserialize(deserializer).map(Rel::from)
        }
    }
}

/// Identifier of a tag: a text string or a UUID.
///
/// In JSON both forms are strings; a string in canonical UUID form decodes as
/// [`TagId::Uuid`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagId {
    Text(String),
    Uuid(Uuid),
}

impl Default for TagId {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for TagId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TagId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for TagId {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl Validate for TagId {
    fn valid(&self) -> Result<()> {
        match self {
            Self::Text(s) if s.is_empty() => Err(ComidError::EmptyTagId.into()),
            Self::Text(_) => Ok(()),
            Self::Uuid(u) => u.valid(),
        }
    }
}

impl Serialize for TagId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Uuid(u) => u.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TagId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TagIdVisitor {
            is_human_readable: bool,
        }

        impl Visitor<'_> for TagIdVisitor {
            type Value = TagId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a text string or a 16-byte UUID")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                match v.parse::<Uuid>() {
                    Ok(uuid) if self.is_human_readable => Ok(TagId::Uuid(uuid)),
                    _ => Ok(TagId::Text(v.to_string())),
                }
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Self::Value, E> {
                Uuid::try_from(v).map(TagId::Uuid).map_err(E::custom)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(TagIdVisitor {
                is_human_readable: true,
            })
        } else {
            deserializer.deserialize_any(TagIdVisitor {
                is_human_readable: false,
            })
        }
    }
}

/// Identity of a CoMID: its tag id and optional version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIdentity {
    pub tag_id: TagId,
    pub tag_version: Option<u64>,
}

impl TagIdentity {
    pub fn new(tag_id: impl Into<TagId>) -> Self {
        Self {
            tag_id: tag_id.into(),
            tag_version: None,
        }
    }
}

impl Validate for TagIdentity {
    fn valid(&self) -> Result<()> {
        self.tag_id.valid()
    }
}

impl Serialize for TagIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(map_len!(self, 1, tag_version)))?;

        if is_human_readable {
            map.serialize_entry("id", &self.tag_id)?;
            if let Some(version) = self.tag_version {
                map.serialize_entry("version", &version)?;
            }
        } else {
            map.serialize_entry(&0, &self.tag_id)?;
            if let Some(version) = self.tag_version {
                map.serialize_entry(&1, &version)?;
            }
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for TagIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TagIdentityVisitor {
            is_human_readable: bool,
            marker: PhantomData<TagIdentity>,
        }

        impl<'de> Visitor<'de> for TagIdentityVisitor {
            type Value = TagIdentity;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing the tag identity")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut identity = TagIdentity::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("id") => identity.tag_id = map.next_value()?,
                            Some("version") => identity.tag_version = Some(map.next_value()?),
                            Some(s) => {
                                return Err(de::Error::unknown_field(s, &["id", "version"]))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => identity.tag_id = map.next_value()?,
                            Some(1) => identity.tag_version = Some(map.next_value()?),
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

                Ok(identity)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(TagIdentityVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// An organization responsible for a CoMID, and its roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub regid: Option<Uri>,
    pub roles: Vec<Role>,
    pub extensions: Extensions,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_regid(mut self, regid: impl Into<Uri>) -> Self {
        self.regid = Some(regid.into());
        self
    }

    pub fn add_role(&mut self, role: Role) -> &mut Self {
        self.roles.push(role);
        self
    }

    pub fn register_extensions(&mut self, exts: &ExtensionsMap) -> Result<()> {
        exts.check(&[ExtensionPoint::ComidEntity])?;
        if let Some(ext) = exts.get(ExtensionPoint::ComidEntity) {
            self.extensions.set(ext.box_clone());
        }
        Ok(())
    }
}

impl Validate for Entity {
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
        for (i, role) in self.roles.iter().enumerate() {
            role.valid()
                .map_err(|e| e.context(format!("role at index {i}")))?;
        }

        self.extensions.validate(Host::Entity(self))
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let len = map_len!(self, 2, regid);

        if is_human_readable {
            let ext = self.extensions.json_entries().map_err(ser::Error::custom)?;
            let mut map = serializer.serialize_map(Some(len + ext.len()))?;
            map.serialize_entry("name", &self.name)?;
            if let Some(regid) = &self.regid {
                map.serialize_entry("regid", regid)?;
            }
            map.serialize_entry("roles", &self.roles)?;
            for (k, v) in &ext {
                map.serialize_entry(k, v)?;
            }
            map.end()
        } else {
            let ext = self.extensions.cbor_entries().map_err(ser::Error::custom)?;
            let mut map = serializer.serialize_map(Some(len + ext.len()))?;
            map.serialize_entry(&0, &self.name)?;
            if let Some(regid) = &self.regid {
                map.serialize_entry(&1, regid)?;
            }
            map.serialize_entry(&2, &self.roles)?;
            for (k, v) in &ext {
                map.serialize_entry(k, v)?;
            }
            map.end()
        }
    }
}

impl<'de> Deserialize<'de> for Entity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntityVisitor {
            is_human_readable: bool,
            marker: PhantomData<Entity>,
        }

        impl<'de> Visitor<'de> for EntityVisitor {
            type Value = Entity;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing entity fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut entity = Entity::default();

                if self.is_human_readable {
                    let mut unknown: Vec<(String, JsonValue)> = vec![];
                    while let Some(key) = map.next_key::<String>()? {
                        match key.as_str() {
                            "name" => entity.name = map.next_value()?,
                            "regid" => entity.regid = Some(map.next_value()?),
                            "roles" => entity.roles = map.next_value()?,
                            _ => unknown.push((key, map.next_value()?)),
                        }
                    }
                    entity
                        .extensions
                        .decode_json(ExtensionPoint::ComidEntity, unknown)
                        .map_err(de::Error::custom)?;
                } else {
                    let mut unknown: Vec<(CborValue, CborValue)> = vec![];
                    while let Some(key) = map.next_key::<i64>()? {
                        match key {
                            0 => entity.name = map.next_value()?,
                            1 => entity.regid = Some(map.next_value()?),
                            2 => entity.roles = map.next_value()?,
                            n => unknown.push((CborValue::from(n), map.next_value()?)),
                        }
                    }
                    entity
                        .extensions
                        .decode_cbor(ExtensionPoint::ComidEntity, unknown)
                        .map_err(de::Error::custom)?;
                }

                Ok(entity)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(EntityVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// A reference to another tag and how this CoMID relates to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedTag {
    pub target: TagId,
    pub rel: Rel,
}

impl LinkedTag {
    pub fn new(target: impl Into<TagId>, rel: Rel) -> Self {
        Self {
            target: target.into(),
            rel,
        }
    }
}

impl Validate for LinkedTag {
    fn valid(&self) -> Result<()> {
        self.target
            .valid()
            .map_err(|e| Error::validation("target", e))?;
        self.rel.valid()
    }
}

impl Serialize for LinkedTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(2))?;

        if is_human_readable {
            map.serialize_entry("target", &self.target)?;
            map.serialize_entry("rel", &self.rel)?;
        } else {
            map.serialize_entry(&0, &self.target)?;
            map.serialize_entry(&1, &self.rel)?;
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for LinkedTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct LinkedTagVisitor {
            is_human_readable: bool,
            marker: PhantomData<LinkedTag>,
        }

        impl<'de> Visitor<'de> for LinkedTagVisitor {
            type Value = LinkedTag;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing a linked tag")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut linked = LinkedTag::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("target") => linked.target = map.next_value()?,
                            Some("rel") => linked.rel = map.next_value()?,
                            Some(s) => return Err(de::Error::unknown_field(s, &["target", "rel"])),
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => linked.target = map.next_value()?,
                            Some(1) => linked.rel = map.next_value()?,
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

                Ok(linked)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(LinkedTagVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

const TRIPLES_POINTS: [ExtensionPoint; 6] = [
    ExtensionPoint::Triples,
    ExtensionPoint::ReferenceValue,
    ExtensionPoint::EndorsedValue,
    ExtensionPoint::CondEndorseSeriesValue,
    ExtensionPoint::Mval,
    ExtensionPoint::Flags,
];

/// A CoMID tag.
#[derive(Debug, Clone, Default)]
pub struct Comid {
    pub language: Option<String>,
    pub tag_identity: TagIdentity,
    pub entities: Option<Vec<Entity>>,
    pub linked_tags: Option<Vec<LinkedTag>>,
    pub triples: Triples,
    pub extensions: Extensions,
    /// Applied to entities added after registration.
    entity_extensions: ExtensionsMap,
}

impl PartialEq for Comid {
    fn eq(&self, other: &Self) -> bool {
        self.language == other.language
            && self.tag_identity == other.tag_identity
            && self.entities() == other.entities()
            && self.linked_tags == other.linked_tags
            && self.triples == other.triples
            && self.extensions == other.extensions
    }
}

impl Eq for Comid {}

impl Comid {
    pub fn new(tag_id: impl Into<TagId>) -> Self {
        Self {
            tag_identity: TagIdentity::new(tag_id),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_tag_version(mut self, version: u64) -> Self {
        self.tag_identity.tag_version = Some(version);
        self
    }

    /// Entities, or `None` when the list is absent or empty.
    pub fn entities(&self) -> Option<&[Entity]> {
        self.entities.as_deref().filter(|e| !e.is_empty())
    }

    pub fn add_entity(
        &mut self,
        name: impl Into<String>,
        regid: Option<Uri>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Result<&mut Self> {
        let mut entity = Entity::new(name);
        entity.regid = regid;
        entity.roles.extend(roles);
        entity.register_extensions(&self.entity_extensions)?;
        entity.valid()?;

        self.entities.get_or_insert_with(Vec::new).push(entity);
        Ok(self)
    }

    pub fn add_linked_tag(&mut self, target: impl Into<TagId>, rel: Rel) -> Result<&mut Self> {
        let linked = LinkedTag::new(target, rel);
        linked.valid()?;

        self.linked_tags.get_or_insert_with(Vec::new).push(linked);
        Ok(self)
    }

    pub fn add_reference_value(&mut self, triple: ValueTriple) -> Result<&mut Self> {
        self.triples.add_reference_value(triple)?;
        Ok(self)
    }

    pub fn add_endorsed_value(&mut self, triple: ValueTriple) -> Result<&mut Self> {
        self.triples.add_endorsed_value(triple)?;
        Ok(self)
    }

    pub fn add_attester_verification_key(&mut self, triple: KeyTriple) -> &mut Self {
        self.triples.add_attester_verification_key(triple);
        self
    }

    pub fn add_dev_identity_key(&mut self, triple: KeyTriple) -> &mut Self {
        self.triples.add_dev_identity_key(triple);
        self
    }

    pub fn add_cond_endorse_series(
        &mut self,
        triple: CondEndorseSeriesTriple,
    ) -> Result<&mut Self> {
        self.triples.add_cond_endorse_series(triple)?;
        Ok(self)
    }

    /// Dispatches `exts` to this CoMID, its entities and its triples.
    ///
    /// A `ComidEntity` extension creates the entity list if needed; it stays
    /// off the wire until an entity is added.
    pub fn register_extensions(&mut self, exts: &ExtensionsMap) -> Result<()> {
        let mut accepted = vec![ExtensionPoint::Comid, ExtensionPoint::ComidEntity];
        accepted.extend(TRIPLES_POINTS);
        exts.check(&accepted)?;

        if let Some(ext) = exts.get(ExtensionPoint::Comid) {
            self.extensions.set(ext.box_clone());
        }

        if exts.get(ExtensionPoint::ComidEntity).is_some() {
            self.entity_extensions = exts.subset(&[ExtensionPoint::ComidEntity]);
            for entity in self.entities.get_or_insert_with(Vec::new) {
                entity.register_extensions(&self.entity_extensions)?;
            }
        }

        let triples_exts = exts.subset(&TRIPLES_POINTS);
        if !triples_exts.is_empty() {
            self.triples.register_extensions(&triples_exts)?;
        }

        Ok(())
    }
}

impl Validate for Comid {
    fn valid(&self) -> Result<()> {
        self.tag_identity
            .valid()
            .map_err(|e| Error::validation("tag-identity", e))?;

        for (i, entity) in self.entities().unwrap_or_default().iter().enumerate() {
            entity.valid().map_err(|e| {
                Error::validation("entities", e.context(format!("entity at index {i}")))
            })?;
        }

        for (i, linked) in self.linked_tags.iter().flatten().enumerate() {
            linked.valid().map_err(|e| {
                Error::validation("linked-tags", e.context(format!("linked tag at index {i}")))
            })?;
        }

        self.triples
            .valid()
            .map_err(|e| Error::validation("triples", e))?;

        self.extensions.validate(Host::Comid(self))
    }
}

impl Serialize for Comid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let entities = self.entities();
        let len = map_len!(self, 2 + entities.is_some() as usize, language, linked_tags);

        if is_human_readable {
            let ext = self.extensions.json_entries().map_err(ser::Error::custom)?;
            let mut map = serializer.serialize_map(Some(len + ext.len()))?;

            if let Some(language) = &self.language {
                map.serialize_entry("lang", language)?;
            }
            map.serialize_entry("tag-identity", &self.tag_identity)?;
            if let Some(entities) = entities {
                map.serialize_entry("entities", entities)?;
            }
            if let Some(linked_tags) = &self.linked_tags {
                map.serialize_entry("linked-tags", linked_tags)?;
            }
            map.serialize_entry("triples", &self.triples)?;
            for (k, v) in &ext {
                map.serialize_entry(k, v)?;
            }

            map.end()
        } else {
            let ext = self.extensions.cbor_entries().map_err(ser::Error::custom)?;
            let mut map = serializer.serialize_map(Some(len + ext.len()))?;

            if let Some(language) = &self.language {
                map.serialize_entry(&0, language)?;
            }
            map.serialize_entry(&1, &self.tag_identity)?;
            if let Some(entities) = entities {
                map.serialize_entry(&2, entities)?;
            }
            if let Some(linked_tags) = &self.linked_tags {
                map.serialize_entry(&3, linked_tags)?;
            }
            map.serialize_entry(&4, &self.triples)?;
            for (k, v) in &ext {
                map.serialize_entry(k, v)?;
            }

            map.end()
        }
    }
}

impl<'de> Deserialize<'de> for Comid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ComidVisitor {
            is_human_readable: bool,
            marker: PhantomData<Comid>,
        }

        impl<'de> Visitor<'de> for ComidVisitor {
            type Value = Comid;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing CoMID fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut comid = Comid::default();

                if self.is_human_readable {
                    let mut unknown: Vec<(String, JsonValue)> = vec![];
                    while let Some(key) = map.next_key::<String>()? {
                        match key.as_str() {
                            "lang" => comid.language = Some(map.next_value()?),
                            "tag-identity" => comid.tag_identity = map.next_value()?,
                            "entities" => comid.entities = Some(map.next_value()?),
                            "linked-tags" => comid.linked_tags = Some(map.next_value()?),
                            "triples" => comid.triples = map.next_value()?,
                            _ => unknown.push((key, map.next_value()?)),
                        }
                    }
                    comid
                        .extensions
                        .decode_json(ExtensionPoint::Comid, unknown)
                        .map_err(de::Error::custom)?;
                } else {
                    let mut unknown: Vec<(CborValue, CborValue)> = vec![];
                    while let Some(key) = map.next_key::<i64>()? {
                        match key {
                            0 => comid.language = Some(map.next_value()?),
                            1 => comid.tag_identity = map.next_value()?,
                            2 => comid.entities = Some(map.next_value()?),
                            3 => comid.linked_tags = Some(map.next_value()?),
                            4 => comid.triples = map.next_value()?,
                            n => unknown.push((CborValue::from(n), map.next_value()?)),
                        }
                    }
                    comid
                        .extensions
                        .decode_cbor(ExtensionPoint::Comid, unknown)
                        .map_err(de::Error::custom)?;
                }

                Ok(comid)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(ComidVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}
