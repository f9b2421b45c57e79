// SPDX-License-Identifier: MIT

//! Tagged type-choice values with pluggable variants.
//!
//! A type choice is a sum type whose variants are told apart by a CBOR tag on
//! the wire and by a `"type"` string in JSON:
//!
//! ```text
//! CBOR: 37(h'31fb5abf023e4992aa4e95f9c1503bfa')
//! JSON: {"type":"uuid","value":"31fb5abf-023e-4992-aa4e-95f9c1503bfa"}
//! ```
//!
//! Each choice (class id, measurement key, instance, ...) is a
//! [`TypeChoice<K>`] where `K` is a marker implementing [`ChoiceKind`]. The
//! marker owns a process-wide [`Registry`] mapping type names to CBOR tags
//! and constructors. Variants are ordinary Rust types implementing
//! [`ChoiceValue`], so profiles can add their own with
//! [`TypeChoice::register`] as long as they do so before the choice is first
//! encoded or decoded.
//!
//! Integer variants (`int`, `uint`) may be registered without a tag with
//! [`TypeChoice::register_untagged`]; bare CBOR integers then decode to them.

use std::{
    any::Any,
    collections::BTreeMap,
    fmt::Debug,
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use ciborium::Value as CborValue;
use serde::{
    de::{self, DeserializeOwned},
    ser,
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value as JsonValue;

use crate::{
    codec::{cbor_hex, from_cbor_value, to_cbor_value},
    ChoiceError, Int, Oid, Result, TaggedBytes, Uint, Ueid, Uuid, Validate,
};

/// CBOR tag for UUIDs
pub const UUID_TAG: u64 = 37;
/// CBOR tag for OIDs (RFC 9090)
pub const OID_TAG: u64 = 111;
/// CBOR tag for UEIDs
pub const UEID_TAG: u64 = 550;
/// CBOR tag for opaque identifier bytes
pub const BYTES_TAG: u64 = 560;

/// Object-safe plumbing shared by every variant type. Implemented
/// automatically for any [`ChoiceValue`] that is `Clone + PartialEq +
/// Serialize`.
pub trait ChoiceValueBase {
    fn box_clone(&self) -> Box<dyn ChoiceValue>;
    fn dyn_eq(&self, other: &dyn ChoiceValue) -> bool;
    fn as_any(&self) -> &dyn Any;
    /// The untagged CBOR payload of this variant.
    fn cbor_payload(&self) -> Result<CborValue>;
    /// The JSON payload placed under `"value"`.
    fn json_payload(&self) -> Result<JsonValue>;
}

impl<T> ChoiceValueBase for T
where
    T: ChoiceValue + Clone + PartialEq + Serialize + 'static,
{
    fn box_clone(&self) -> Box<dyn ChoiceValue> {
        Box::new(self.clone())
    }

    fn dyn_eq(&self, other: &dyn ChoiceValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn cbor_payload(&self) -> Result<CborValue> {
        to_cbor_value(self)
    }

    fn json_payload(&self) -> Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A variant of a type choice.
pub trait ChoiceValue: ChoiceValueBase + Validate + Debug + Send + Sync {
    /// The name used as `"type"` in JSON and as the registry key.
    fn type_name(&self) -> &'static str;
}

/// Inputs accepted by variant factories.
pub enum ChoiceInput {
    /// Produce the zero value.
    None,
    /// An instance of the variant's own type.
    Value(Box<dyn Any + Send>),
    Text(String),
    Bytes(Vec<u8>),
    Uint(u64),
    Int(i64),
}

impl ChoiceInput {
    pub fn value<T: Any + Send>(value: T) -> Self {
        Self::Value(Box::new(value))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "nil",
            Self::Value(_) => "value",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Uint(_) => "uint",
            Self::Int(_) => "int",
        }
    }

    /// Recovers a `T` passed as [`ChoiceInput::Value`]; any other input is
    /// rejected on behalf of `type_name`.
    pub fn into_value<T: Any>(self, type_name: &'static str) -> Result<T> {
        match self {
            Self::Value(boxed) => boxed.downcast::<T>().map(|b| *b).map_err(|_| {
                ChoiceError::UnexpectedInput {
                    type_name,
                    input: "value",
                }
                .into()
            }),
            other => Err(ChoiceError::UnexpectedInput {
                type_name,
                input: other.kind(),
            }
            .into()),
        }
    }
}

impl Debug for ChoiceInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChoiceInput::{}", self.kind())
    }
}

impl From<&str> for ChoiceInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ChoiceInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for ChoiceInput {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for ChoiceInput {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<u64> for ChoiceInput {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<i64> for ChoiceInput {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ChoiceInput {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

/// Builds a variant from a [`ChoiceInput`].
pub type Factory = fn(ChoiceInput) -> Result<Box<dyn ChoiceValue>>;
type CborDecoder = fn(&CborValue) -> Result<Box<dyn ChoiceValue>>;
type JsonDecoder = fn(JsonValue) -> Result<Box<dyn ChoiceValue>>;

fn decode_cbor_as<T: ChoiceValue + DeserializeOwned + 'static>(
    value: &CborValue,
) -> Result<Box<dyn ChoiceValue>> {
    Ok(Box::new(from_cbor_value::<T>(value)?))
}

fn decode_json_as<T: ChoiceValue + DeserializeOwned + 'static>(
    value: JsonValue,
) -> Result<Box<dyn ChoiceValue>> {
    Ok(Box::new(serde_json::from_value::<T>(value)?))
}

#[derive(Clone, Copy)]
struct Variant {
    tag: Option<u64>,
    factory: Factory,
    from_cbor: CborDecoder,
    from_json: JsonDecoder,
}

/// The variants known to one type choice.
pub struct Registry {
    variants: BTreeMap<&'static str, Variant>,
    tags: BTreeMap<u64, &'static str>,
    untagged: Option<&'static str>,
    in_use: AtomicBool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            variants: BTreeMap::new(),
            tags: BTreeMap::new(),
            untagged: None,
            in_use: AtomicBool::new(false),
        }
    }

    /// Adds a built-in variant. `tag` of `None` marks the untagged integer
    /// variant. Later entries replace earlier ones with the same name.
    pub fn with<T>(mut self, tag: Option<u64>, factory: Factory) -> Self
    where
        T: ChoiceValue + DeserializeOwned + Default + 'static,
    {
        let name = T::default().type_name();
        self.put::<T>(name, tag, factory);
        self
    }

    fn put<T: ChoiceValue + DeserializeOwned + 'static>(
        &mut self,
        name: &'static str,
        tag: Option<u64>,
        factory: Factory,
    ) {
        match tag {
            Some(tag) => {
                self.tags.insert(tag, name);
            }
            None => self.untagged = Some(name),
        }
        self.variants.insert(
            name,
            Variant {
                tag,
                factory,
                from_cbor: decode_cbor_as::<T>,
                from_json: decode_json_as::<T>,
            },
        );
    }

    fn insert<T: ChoiceValue + DeserializeOwned + 'static>(
        &mut self,
        choice: &'static str,
        tag: Option<u64>,
        factory: Factory,
    ) -> Result<()> {
        let name = factory(ChoiceInput::None)?.type_name();

        match tag {
            Some(tag) if self.tags.contains_key(&tag) => {
                return Err(ChoiceError::TagRegistered(tag).into());
            }
            None if self.untagged.is_some() => {
                return Err(ChoiceError::UntaggedRegistered(choice).into());
            }
            _ => {}
        }

        if self.variants.contains_key(name) {
            return Err(ChoiceError::NameRegistered {
                choice,
                name: name.to_string(),
            }
            .into());
        }

        if self.in_use.load(Ordering::Acquire) {
            return Err(ChoiceError::RegistryInUse(choice).into());
        }

        self.put::<T>(name, tag, factory);
        Ok(())
    }

    fn variant(&self, name: &str) -> Option<Variant> {
        self.variants.get(name).copied()
    }

    fn mark_in_use(&self) {
        self.in_use.store(true, Ordering::Release);
    }
}

/// A type choice: one marker type per choice, each with its own registry.
pub trait ChoiceKind: 'static {
    /// Human readable choice name used in error messages.
    const NAME: &'static str;

    fn registry() -> &'static RwLock<Registry>;
}

fn read<K: ChoiceKind>() -> RwLockReadGuard<'static, Registry> {
    K::registry().read().unwrap_or_else(PoisonError::into_inner)
}

fn write<K: ChoiceKind>() -> RwLockWriteGuard<'static, Registry> {
    K::registry().write().unwrap_or_else(PoisonError::into_inner)
}

/// Carrier for a single variant of choice `K`.
pub struct TypeChoice<K: ChoiceKind> {
    value: Option<Box<dyn ChoiceValue>>,
    kind: PhantomData<K>,
}

impl<K: ChoiceKind> TypeChoice<K> {
    /// Builds a value of the variant registered as `type_name` from `input`.
    pub fn new(input: impl Into<ChoiceInput>, type_name: &str) -> Result<Self> {
        let variant = read::<K>()
            .variant(type_name)
            .ok_or_else(|| ChoiceError::UnknownType {
                choice: K::NAME,
                name: type_name.to_string(),
            })?;

        Ok(Self::from_boxed((variant.factory)(input.into())?))
    }

    pub fn from_value<T: ChoiceValue + 'static>(value: T) -> Self {
        Self::from_boxed(Box::new(value))
    }

    pub fn from_boxed(value: Box<dyn ChoiceValue>) -> Self {
        Self {
            value: Some(value),
            kind: PhantomData,
        }
    }

    /// Registers a new tagged variant.
    ///
    /// Fails if `tag` is already bound, if the type name produced by
    /// `factory` is already registered, or once this choice has been encoded
    /// or decoded.
    pub fn register<T>(tag: u64, factory: Factory) -> Result<()>
    where
        T: ChoiceValue + DeserializeOwned + 'static,
    {
        write::<K>().insert::<T>(K::NAME, Some(tag), factory)
    }

    /// Registers the variant that bare CBOR integers decode to.
    pub fn register_untagged<T>(factory: Factory) -> Result<()>
    where
        T: ChoiceValue + DeserializeOwned + 'static,
    {
        write::<K>().insert::<T>(K::NAME, None, factory)
    }

    /// Names of all registered variants.
    pub fn registered_types() -> Vec<&'static str> {
        read::<K>().variants.keys().copied().collect()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&dyn ChoiceValue> {
        self.value.as_deref()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.as_ref()?.as_any().downcast_ref::<T>()
    }

    pub fn type_name(&self) -> Option<&'static str> {
        self.value.as_ref().map(|v| v.type_name())
    }

    fn set_value(&self) -> Result<&dyn ChoiceValue> {
        self.value
            .as_deref()
            .ok_or_else(|| ChoiceError::NilValue.into())
    }

    fn invalid(type_name: &str, reason: crate::Error) -> crate::Error {
        ChoiceError::Invalid {
            type_name: type_name.to_string(),
            reason: Box::new(reason),
        }
        .into()
    }

    /// Encodes the value as a CBOR item, tagged with the variant's tag.
    pub fn to_cbor_value(&self) -> Result<CborValue> {
        let value = self.set_value()?;
        let registry = read::<K>();
        registry.mark_in_use();

        let variant = registry
            .variant(value.type_name())
            .ok_or_else(|| ChoiceError::UnknownType {
                choice: K::NAME,
                name: value.type_name().to_string(),
            })?;
        drop(registry);

        let payload = value.cbor_payload()?;
        Ok(match variant.tag {
            Some(tag) => CborValue::Tag(tag, Box::new(payload)),
            None => payload,
        })
    }

    /// Decodes a CBOR item by dispatching on its tag, or on its major type
    /// for untagged integers.
    pub fn from_cbor_value(value: &CborValue) -> Result<Self> {
        let registry = read::<K>();
        registry.mark_in_use();

        let (name, payload) = match value {
            CborValue::Tag(tag, inner) => (registry.tags.get(tag).copied(), inner.as_ref()),
            CborValue::Integer(_) => (registry.untagged, value),
            _ => (None, value),
        };

        let variant = name
            .and_then(|name| registry.variant(name))
            .ok_or_else(|| ChoiceError::UnknownCbor {
                choice: K::NAME,
                hex: cbor_hex(value),
            })?;
        drop(registry);

        let value = (variant.from_cbor)(payload)?;
        value
            .valid()
            .map_err(|e| Self::invalid(value.type_name(), e))?;

        Ok(Self::from_boxed(value))
    }

    /// Encodes the value as `{"type": ..., "value": ...}`.
    pub fn to_json_value(&self) -> Result<JsonValue> {
        let value = self.set_value()?;
        let registry = read::<K>();
        registry.mark_in_use();

        if registry.variant(value.type_name()).is_none() {
            return Err(ChoiceError::UnknownType {
                choice: K::NAME,
                name: value.type_name().to_string(),
            }
            .into());
        }
        drop(registry);

        let mut obj = serde_json::Map::new();
        obj.insert("type".to_string(), JsonValue::from(value.type_name()));
        obj.insert("value".to_string(), value.json_payload()?);
        Ok(JsonValue::Object(obj))
    }

    /// Decodes `payload` as the variant registered under `type_name` and
    /// validates it.
    pub fn from_json_parts(type_name: &str, payload: JsonValue) -> Result<Self> {
        let registry = read::<K>();
        registry.mark_in_use();

        let variant = registry
            .variant(type_name)
            .ok_or_else(|| ChoiceError::UnknownType {
                choice: K::NAME,
                name: type_name.to_string(),
            })?;
        drop(registry);

        let value = (variant.from_json)(payload).map_err(|e| Self::invalid(type_name, e))?;
        value.valid().map_err(|e| Self::invalid(type_name, e))?;

        Ok(Self::from_boxed(value))
    }
}

impl<K: ChoiceKind> Validate for TypeChoice<K> {
    fn valid(&self) -> Result<()> {
        let value = self.set_value()?;
        value
            .valid()
            .map_err(|e| Self::invalid(value.type_name(), e))
    }
}

impl<K: ChoiceKind> Default for TypeChoice<K> {
    fn default() -> Self {
        Self {
            value: None,
            kind: PhantomData,
        }
    }
}

impl<K: ChoiceKind> Clone for TypeChoice<K> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.as_ref().map(|v| v.box_clone()),
            kind: PhantomData,
        }
    }
}

impl<K: ChoiceKind> PartialEq for TypeChoice<K> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.value, &other.value) {
            (Some(a), Some(b)) => a.dyn_eq(b.as_ref()),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<K: ChoiceKind> Eq for TypeChoice<K> {}

impl<K: ChoiceKind> Debug for TypeChoice<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}({:?})", K::NAME, v),
            None => write!(f, "{}(nil)", K::NAME),
        }
    }
}

impl<K: ChoiceKind> Serialize for TypeChoice<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            self.to_json_value()
                .map_err(ser::Error::custom)?
                .serialize(serializer)
        } else {
            self.to_cbor_value()
                .map_err(ser::Error::custom)?
                .serialize(serializer)
        }
    }
}

impl<'de, K: ChoiceKind> Deserialize<'de> for TypeChoice<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            #[derive(Deserialize)]
            struct Repr {
                #[serde(rename = "type")]
                type_name: Option<String>,
                value: Option<JsonValue>,
            }

            let repr = Repr::deserialize(deserializer)?;
            let type_name = repr
                .type_name
                .ok_or_else(|| de::Error::custom(ChoiceError::MissingEntry("type")))?;

            Self::from_json_parts(&type_name, repr.value.unwrap_or(JsonValue::Null))
                .map_err(de::Error::custom)
        } else {
            let value = CborValue::deserialize(deserializer)?;
            Self::from_cbor_value(&value).map_err(de::Error::custom)
        }
    }
}

/// Factory for [`Uuid`] variants: accepts the canonical string or 16 raw bytes.
pub fn uuid_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let uuid = match input {
        ChoiceInput::None => Uuid::default(),
        ChoiceInput::Text(s) => s.parse::<Uuid>()?,
        ChoiceInput::Bytes(b) => Uuid::try_from(b.as_slice())?,
        other => other.into_value::<Uuid>("uuid")?,
    };
    Ok(Box::new(uuid))
}

/// Factory for [`Oid`] variants: accepts dotted decimal or BER value octets.
pub fn oid_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let oid = match input {
        ChoiceInput::None => Oid::default(),
        ChoiceInput::Text(s) => s.parse::<Oid>()?,
        ChoiceInput::Bytes(b) => Oid::from_der_value(b),
        other => other.into_value::<Oid>("oid")?,
    };
    Ok(Box::new(oid))
}

/// Factory for [`Ueid`] variants: accepts raw bytes.
pub fn ueid_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let ueid = match input {
        ChoiceInput::None => Ueid::default(),
        ChoiceInput::Bytes(b) => Ueid::from(b),
        other => other.into_value::<Ueid>("ueid")?,
    };
    Ok(Box::new(ueid))
}

/// Factory for [`TaggedBytes`] variants: accepts raw bytes or base64 text.
pub fn bytes_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let bytes = match input {
        ChoiceInput::None => TaggedBytes::default(),
        ChoiceInput::Bytes(b) => TaggedBytes(b.into()),
        ChoiceInput::Text(s) => s.parse::<TaggedBytes>()?,
        other => other.into_value::<TaggedBytes>("bytes")?,
    };
    Ok(Box::new(bytes))
}

/// Factory for [`Int`] variants.
pub fn int_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let int = match input {
        ChoiceInput::None => Int::default(),
        ChoiceInput::Int(i) => Int(i),
        ChoiceInput::Uint(u) => Int(i64::try_from(u).map_err(|_| {
            ChoiceError::UnexpectedInput {
                type_name: "int",
                input: "uint",
            }
        })?),
        ChoiceInput::Text(s) => Int(s.parse::<i64>().map_err(|_| {
            ChoiceError::UnexpectedInput {
                type_name: "int",
                input: "text",
            }
        })?),
        other => other.into_value::<Int>("int")?,
    };
    Ok(Box::new(int))
}

/// Factory for [`Uint`] variants.
pub fn uint_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let uint = match input {
        ChoiceInput::None => Uint::default(),
        ChoiceInput::Uint(u) => Uint(u),
        ChoiceInput::Int(i) => Uint(u64::try_from(i).map_err(|_| {
            ChoiceError::UnexpectedInput {
                type_name: "uint",
                input: "int",
            }
        })?),
        ChoiceInput::Text(s) => Uint(s.parse::<u64>().map_err(|_| {
            ChoiceError::UnexpectedInput {
                type_name: "uint",
                input: "text",
            }
        })?),
        other => other.into_value::<Uint>("uint")?,
    };
    Ok(Box::new(uint))
}

#[cfg(test)]
#[rustfmt::skip::macros(vec)]
mod tests {
    use super::*;
    use crate::macros::choice_kind;

    choice_kind!(
        SampleKind,
        "sample",
        Registry::new()
            .with::<Uuid>(Some(UUID_TAG), uuid_factory)
            .with::<Int>(None, int_factory)
    );

    type Sample = TypeChoice<SampleKind>;

    choice_kind!(
        ScratchKind,
        "scratch",
        Registry::new().with::<Uuid>(Some(UUID_TAG), uuid_factory)
    );

    type Scratch = TypeChoice<ScratchKind>;

    #[test]
    fn test_new_and_accessors() {
        let sample = Sample::new("31fb5abf-023e-4992-aa4e-95f9c1503bfa", "uuid").unwrap();
        assert_eq!(sample.type_name(), Some("uuid"));
        assert!(sample.downcast_ref::<Uuid>().is_some());
        sample.valid().unwrap();

        let by_value = Sample::new(ChoiceInput::value(Int(7)), "int").unwrap();
        assert_eq!(by_value.downcast_ref::<Int>(), Some(&Int(7)));

        let zero = Sample::new(ChoiceInput::None, "int").unwrap();
        assert_eq!(zero, Sample::from_value(Int(0)));

        let err = Sample::new("x", "foo").err().unwrap();
        assert_eq!(err.to_string(), "unknown sample type: foo");

        let err = Sample::new(vec![1u8, 2], "int").err().unwrap();
        assert_eq!(err.to_string(), "unexpected input for int: bytes");

        let nil = Sample::default();
        assert_eq!(nil.valid().err().unwrap().to_string(), "nil value");
    }

    #[test]
    fn test_invalid_variant() {
        let sample = Sample::from_value(Uuid::from([0u8; 16]));
        assert_eq!(
            sample.valid().err().unwrap().to_string(),
            "invalid uuid: expecting RFC4122 UUID, got Reserved instead"
        );
    }

    #[test]
    fn test_serde() {
        let sample = Sample::new("31fb5abf-023e-4992-aa4e-95f9c1503bfa", "uuid").unwrap();

        let mut actual_cbor: Vec<u8> = vec![];
        ciborium::into_writer(&sample, &mut actual_cbor).unwrap();

        let expected_cbor: Vec<u8> = vec![
            0xd8, 0x25, // tag(37)
              0x50, // bstr(16)
                0x31, 0xfb, 0x5a, 0xbf, 0x02, 0x3e, 0x49, 0x92,
                0xaa, 0x4e, 0x95, 0xf9, 0xc1, 0x50, 0x3b, 0xfa,
        ];

        assert_eq!(actual_cbor, expected_cbor);

        let sample_de: Sample = ciborium::from_reader(actual_cbor.as_slice()).unwrap();
        assert_eq!(sample_de, sample);

        let actual_json = serde_json::to_string(&sample).unwrap();
        assert_eq!(
            actual_json,
            r#"{"type":"uuid","value":"31fb5abf-023e-4992-aa4e-95f9c1503bfa"}"#
        );

        let sample_de: Sample = serde_json::from_str(&actual_json).unwrap();
        assert_eq!(sample_de, sample);

        let int = Sample::from_value(Int(-2));
        let mut actual_cbor: Vec<u8> = vec![];
        ciborium::into_writer(&int, &mut actual_cbor).unwrap();
        assert_eq!(actual_cbor, vec![0x21]);

        let int_de: Sample = ciborium::from_reader(actual_cbor.as_slice()).unwrap();
        assert_eq!(int_de, int);
    }

    #[test]
    fn test_unknown_cbor() {
        let data: Vec<u8> = vec![
            0xd9, 0x03, 0xe7, // tag(999)
              0x41, 0x00,
        ];

        let err = ciborium::from_reader::<Sample, _>(data.as_slice())
            .err()
            .unwrap()
            .to_string();

        assert_eq!(err, "Semantic(None, \"unknown sample (CBOR: d903e74100)\")");

        let err = ciborium::from_reader::<Sample, _>([0x61, 0x61].as_slice())
            .err()
            .unwrap()
            .to_string();

        assert_eq!(err, "Semantic(None, \"unknown sample (CBOR: 6161)\")");
    }

    #[test]
    fn test_cbor_validates_variant() {
        let data: Vec<u8> = vec![
            0xd8, 0x25, // tag(37)
              0x50, // bstr(16)
                0x31, 0xfb, 0x5a, 0xbf, 0x02, 0x3e, 0x49, 0x92,
                0x0a, 0x4e, 0x95, 0xf9, 0xc1, 0x50, 0x3b, 0xfa,
        ];

        let err = ciborium::from_reader::<Sample, _>(data.as_slice())
            .err()
            .unwrap()
            .to_string();

        assert_eq!(
            err,
            "Semantic(None, \"invalid uuid: expecting RFC4122 UUID, got Reserved instead\")"
        );
    }

    #[test]
    fn test_json_errors() {
        let err = serde_json::from_str::<Sample>(r#"{"type":"foo","value":1}"#)
            .err()
            .unwrap()
            .to_string();
        assert!(err.starts_with("unknown sample type: foo"), "{err}");

        let err = serde_json::from_str::<Sample>(
            r#"{"type":"uuid","value":"31fb5abf-023e-4992-0a4e-95f9c1503bfa"}"#,
        )
        .err()
        .unwrap()
        .to_string();
        assert!(
            err.starts_with("invalid uuid: expecting RFC4122 UUID, got Reserved instead"),
            "{err}"
        );

        let err = serde_json::from_str::<Sample>(r#"{"value":1}"#)
            .err()
            .unwrap()
            .to_string();
        assert!(err.starts_with("missing \"type\" entry"), "{err}");
    }

    #[test]
    fn test_register_duplicates() {
        let err = Sample::register::<Uuid>(99, uuid_factory).err().unwrap();
        assert_eq!(err.to_string(), "sample type with name \"uuid\" already exists");

        let err = Sample::register::<Oid>(UUID_TAG, oid_factory).err().unwrap();
        assert_eq!(err.to_string(), "tag 37 is already registered");

        let err = Sample::register_untagged::<Uint>(uint_factory).err().unwrap();
        assert_eq!(err.to_string(), "sample already admits an untagged integer variant");
    }

    #[test]
    fn test_register_then_seal() {
        Scratch::register::<Oid>(OID_TAG, oid_factory).unwrap();
        assert_eq!(Scratch::registered_types(), vec!["oid", "uuid"]);

        let oid = Scratch::new("1.2.3", "oid").unwrap();
        let mut buf: Vec<u8> = vec![];
        ciborium::into_writer(&oid, &mut buf).unwrap();
        assert_eq!(buf, vec![0xd8, 0x6f, 0x42, 0x2a, 0x03]);

        let err = Scratch::register::<TaggedBytes>(BYTES_TAG, bytes_factory)
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "registration closed: scratch registry already in use"
        );
    }
}
