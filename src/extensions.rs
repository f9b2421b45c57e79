// SPDX-License-Identifier: MIT

//! Profile extensions.
//!
//! A profile extends CoMID documents by attaching an [`Extension`] at one of
//! the named [`ExtensionPoint`]s. An extension is an ordinary serde type whose
//! map entries are merged into its host's map on the wire:
//!
//! * in CBOR the extension's integer keys follow the host's built-in keys;
//! * in JSON its field names follow the host's built-in fields.
//!
//! Extensions are attached either explicitly, with `register_extensions` on a
//! document (see [`ExtensionsMap`]), or process-wide with
//! [`register_extension`], in which case every decoded host of that point gets
//! a fresh instance populated from the keys the host does not recognize.
//!
//! Hosts call [`Extension::validate`] after their own checks, and a `Flags`
//! extension additionally answers the tri-state flag operations through
//! [`FlagsExtension`].
//!
//! Process-wide registration must complete before the first extension-bearing
//! document is encoded or decoded.

use std::{
    any::Any,
    collections::BTreeMap,
    fmt::{Debug, Display},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        LazyLock, PoisonError, RwLock,
    },
};

use ciborium::Value as CborValue;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    codec::{from_cbor_value, to_cbor_value},
    comid::{Comid, Entity},
    measurement::{FlagsMap, Mval},
    triples::Triples,
    Error, ExtensionError, Result,
};

/// Named places where a profile may attach an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtensionPoint {
    Comid,
    ComidEntity,
    Triples,
    /// Measurement values of reference-value triples.
    ReferenceValue,
    /// Measurement values of endorsed-value triples.
    EndorsedValue,
    Mval,
    Flags,
    /// Measurement values inside conditional endorsement series.
    CondEndorseSeriesValue,
}

impl ExtensionPoint {
    pub const ALL: [ExtensionPoint; 8] = [
        Self::Comid,
        Self::ComidEntity,
        Self::Triples,
        Self::ReferenceValue,
        Self::EndorsedValue,
        Self::Mval,
        Self::Flags,
        Self::CondEndorseSeriesValue,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Comid => "Comid",
            Self::ComidEntity => "ComidEntity",
            Self::Triples => "Triples",
            Self::ReferenceValue => "ReferenceValue",
            Self::EndorsedValue => "EndorsedValue",
            Self::Mval => "Mval",
            Self::Flags => "Flags",
            Self::CondEndorseSeriesValue => "CondEndorseSeriesValue",
        }
    }

    pub(crate) fn unexpected(self) -> Error {
        ExtensionError::UnexpectedPoint(self.name().to_string()).into()
    }
}

impl Display for ExtensionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExtensionPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ExtensionError::UnexpectedPoint(s.to_string()).into())
    }
}

/// The entity an extension is attached to, handed to validation hooks.
#[derive(Debug, Clone, Copy)]
pub enum Host<'a> {
    Comid(&'a Comid),
    Entity(&'a Entity),
    Triples(&'a Triples),
    Mval(&'a Mval),
    Flags(&'a FlagsMap),
}

/// Tri-state flag hooks for extensions attached at [`ExtensionPoint::Flags`].
///
/// The setters return `false` when the flag is not known to the extension.
pub trait FlagsExtension {
    fn set_true(&mut self, flag: &str) -> bool;
    fn set_false(&mut self, flag: &str) -> bool;
    fn clear(&mut self, flag: &str) -> bool;
    fn get(&self, flag: &str) -> Option<bool>;
    fn any_set(&self) -> bool;
}

/// Object-safe plumbing implemented for every `Extension` that is also
/// `Clone + PartialEq + Serialize + DeserializeOwned`.
pub trait ExtensionBase {
    fn box_clone(&self) -> Box<dyn Extension>;
    fn dyn_eq(&self, other: &dyn Extension) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn cbor_entries(&self) -> Result<Vec<(CborValue, CborValue)>>;
    fn json_entries(&self) -> Result<Vec<(String, JsonValue)>>;
    fn decode_cbor_entries(&mut self, entries: Vec<(CborValue, CborValue)>) -> Result<()>;
    fn decode_json_entries(&mut self, entries: Vec<(String, JsonValue)>) -> Result<()>;
}

impl<T> ExtensionBase for T
where
    T: Extension + Clone + PartialEq + Serialize + DeserializeOwned + 'static,
{
    fn box_clone(&self) -> Box<dyn Extension> {
        Box::new(self.clone())
    }

    fn dyn_eq(&self, other: &dyn Extension) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn cbor_entries(&self) -> Result<Vec<(CborValue, CborValue)>> {
        match to_cbor_value(self)? {
            CborValue::Map(mut entries) => {
                entries.sort_by(|(a, _), (b, _)| cbor_key_order(a, b));
                Ok(entries)
            }
            _ => Err(Error::encoding("extension must encode to a map")),
        }
    }

    fn json_entries(&self) -> Result<Vec<(String, JsonValue)>> {
        match serde_json::to_value(self)? {
            JsonValue::Object(obj) => Ok(obj.into_iter().collect()),
            _ => Err(Error::encoding("extension must encode to a map")),
        }
    }

    fn decode_cbor_entries(&mut self, entries: Vec<(CborValue, CborValue)>) -> Result<()> {
        *self = from_cbor_value(&CborValue::Map(entries))?;
        Ok(())
    }

    fn decode_json_entries(&mut self, entries: Vec<(String, JsonValue)>) -> Result<()> {
        *self = serde_json::from_value(JsonValue::Object(entries.into_iter().collect()))?;
        Ok(())
    }
}

/// Ascending integer keys first, then anything else in encoding order.
fn cbor_key_order(a: &CborValue, b: &CborValue) -> std::cmp::Ordering {
    match (a.as_integer(), b.as_integer()) {
        (Some(a), Some(b)) => i128::from(a).cmp(&i128::from(b)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

/// A profile extension.
pub trait Extension: ExtensionBase + Debug + Send + Sync {
    /// Called after the host passed its own validation.
    fn validate(&self, _host: Host<'_>) -> Result<()> {
        Ok(())
    }

    fn flags(&self) -> Option<&dyn FlagsExtension> {
        None
    }

    fn flags_mut(&mut self) -> Option<&mut dyn FlagsExtension> {
        None
    }
}

#[derive(Clone)]
enum Unparsed {
    Cbor(Vec<(CborValue, CborValue)>),
    Json(Vec<(String, JsonValue)>),
}

/// Extension slot of a host entity.
///
/// Keys that the host did not recognize during decoding are kept aside so
/// that an extension attached later (for instance by the enclosing triple)
/// can still be populated from them. They are never re-encoded.
#[derive(Default)]
pub struct Extensions {
    value: Option<Box<dyn Extension>>,
    unparsed: Option<Unparsed>,
}

impl Extensions {
    pub fn new(ext: Box<dyn Extension>) -> Self {
        Self {
            value: Some(ext),
            unparsed: None,
        }
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn set(&mut self, ext: Box<dyn Extension>) {
        self.value = Some(ext);
    }

    pub fn value(&self) -> Option<&dyn Extension> {
        self.value.as_deref()
    }

    pub fn value_mut(&mut self) -> Option<&mut (dyn Extension + 'static)> {
        self.value.as_deref_mut()
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.value.as_ref()?.as_any().downcast_ref::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.value.as_mut()?.as_any_mut().downcast_mut::<T>()
    }

    pub fn flags(&self) -> Option<&dyn FlagsExtension> {
        self.value.as_ref()?.flags()
    }

    pub fn flags_mut(&mut self) -> Option<&mut dyn FlagsExtension> {
        self.value.as_mut()?.flags_mut()
    }

    /// `true` when nothing would be written to the wire.
    pub fn is_empty(&self) -> bool {
        match &self.value {
            None => true,
            Some(ext) => ext.cbor_entries().map_or(false, |e| e.is_empty()),
        }
    }

    pub(crate) fn validate(&self, host: Host<'_>) -> Result<()> {
        match &self.value {
            Some(ext) => ext.validate(host),
            None => Ok(()),
        }
    }

    pub(crate) fn cbor_entries(&self) -> Result<Vec<(CborValue, CborValue)>> {
        mark_in_use();
        match &self.value {
            Some(ext) => ext.cbor_entries(),
            None => Ok(vec![]),
        }
    }

    pub(crate) fn json_entries(&self) -> Result<Vec<(String, JsonValue)>> {
        mark_in_use();
        match &self.value {
            Some(ext) => ext.json_entries(),
            None => Ok(vec![]),
        }
    }

    /// Hands the unrecognized CBOR entries of a host to the extension
    /// registered for `point`, if any.
    pub(crate) fn decode_cbor(
        &mut self,
        point: ExtensionPoint,
        entries: Vec<(CborValue, CborValue)>,
    ) -> Result<()> {
        if self.value.is_none() {
            self.value = new_registered(point);
        }
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(ext) = &mut self.value {
            ext.decode_cbor_entries(entries.clone())?;
        }
        self.unparsed = Some(Unparsed::Cbor(entries));
        Ok(())
    }

    pub(crate) fn decode_json(
        &mut self,
        point: ExtensionPoint,
        entries: Vec<(String, JsonValue)>,
    ) -> Result<()> {
        if self.value.is_none() {
            self.value = new_registered(point);
        }
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(ext) = &mut self.value {
            ext.decode_json_entries(entries.clone())?;
        }
        self.unparsed = Some(Unparsed::Json(entries));
        Ok(())
    }

    /// Replaces the slot's extension with the one registered for `point`,
    /// populated from the entries kept aside during decoding. A slot is left
    /// alone when nothing is registered for `point`.
    pub(crate) fn attach_registered(&mut self, point: ExtensionPoint) -> Result<()> {
        let Some(mut ext) = new_registered(point) else {
            return Ok(());
        };

        match self.unparsed.clone() {
            Some(Unparsed::Cbor(entries)) => ext.decode_cbor_entries(entries)?,
            Some(Unparsed::Json(entries)) => ext.decode_json_entries(entries)?,
            None => {}
        }

        self.value = Some(ext);
        Ok(())
    }
}

impl Clone for Extensions {
    fn clone(&self) -> Self {
        Self {
            value: self.value.as_ref().map(|v| v.box_clone()),
            unparsed: self.unparsed.clone(),
        }
    }
}

impl PartialEq for Extensions {
    fn eq(&self, other: &Self) -> bool {
        match (&self.value, &other.value) {
            (Some(a), Some(b)) => a.dyn_eq(b.as_ref()),
            _ => self.is_empty() && other.is_empty(),
        }
    }
}

impl Eq for Extensions {}

impl Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(ext) => write!(f, "Extensions({ext:?})"),
            None => f.write_str("Extensions(None)"),
        }
    }
}

/// Extensions to attach to a document, keyed by extension point.
#[derive(Default)]
pub struct ExtensionsMap(BTreeMap<ExtensionPoint, Box<dyn Extension>>);

impl ExtensionsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Extension + 'static>(mut self, point: ExtensionPoint, ext: T) -> Self {
        self.0.insert(point, Box::new(ext));
        self
    }

    pub fn insert(&mut self, point: ExtensionPoint, ext: Box<dyn Extension>) {
        self.0.insert(point, ext);
    }

    pub fn get(&self, point: ExtensionPoint) -> Option<&dyn Extension> {
        self.0.get(&point).map(|e| e.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExtensionPoint, &dyn Extension)> {
        self.0.iter().map(|(p, e)| (*p, e.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The entries for `points`, in a map of their own.
    pub(crate) fn subset(&self, points: &[ExtensionPoint]) -> ExtensionsMap {
        ExtensionsMap(
            self.0
                .iter()
                .filter(|(p, _)| points.contains(p))
                .map(|(p, e)| (*p, e.box_clone()))
                .collect(),
        )
    }

    /// Fails on the first point not in `accepted`.
    pub(crate) fn check(&self, accepted: &[ExtensionPoint]) -> Result<()> {
        match self.0.keys().find(|p| !accepted.contains(p)) {
            Some(p) => Err(p.unexpected()),
            None => Ok(()),
        }
    }
}

impl Clone for ExtensionsMap {
    fn clone(&self) -> Self {
        Self(self.0.iter().map(|(p, e)| (*p, e.box_clone())).collect())
    }
}

impl Debug for ExtensionsMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

/// Builds a fresh extension instance.
pub type ExtensionFactory = fn() -> Box<dyn Extension>;

#[derive(Default)]
struct ExtensionRegistry {
    factories: BTreeMap<ExtensionPoint, ExtensionFactory>,
    in_use: AtomicBool,
}

static REGISTRY: LazyLock<RwLock<ExtensionRegistry>> =
    LazyLock::new(|| RwLock::new(ExtensionRegistry::default()));

/// Registers the extension instantiated for every decoded host of `point`.
pub fn register_extension(point: ExtensionPoint, factory: ExtensionFactory) -> Result<()> {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);

    if registry.factories.contains_key(&point) {
        return Err(ExtensionError::AlreadyRegistered(point.name().to_string()).into());
    }
    if registry.in_use.load(Ordering::Acquire) {
        return Err(ExtensionError::RegistryInUse.into());
    }

    registry.factories.insert(point, factory);
    Ok(())
}

/// Extension points with a process-wide registration.
pub fn registered_points() -> Vec<ExtensionPoint> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.factories.keys().copied().collect()
}

fn mark_in_use() {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.in_use.store(true, Ordering::Release);
}

fn new_registered(point: ExtensionPoint) -> Option<Box<dyn Extension>> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.in_use.store(true, Ordering::Release);
    registry.factories.get(&point).map(|factory| factory())
}

#[cfg(test)]
#[rustfmt::skip::macros(vec)]
mod tests {
    use super::*;
    use serde::{ser::SerializeMap, Deserialize, Deserializer, Serializer};

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Firmware {
        build: Option<String>,
    }

    impl Serialize for Firmware {
        fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
            let is_human_readable = serializer.is_human_readable();
            let mut map = serializer.serialize_map(Some(self.build.is_some() as usize))?;
            if let Some(build) = &self.build {
                if is_human_readable {
                    map.serialize_entry("build", build)?;
                } else {
                    map.serialize_entry(&-70000, build)?;
                }
            }
            map.end()
        }
    }

    impl<'de> Deserialize<'de> for Firmware {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
            if deserializer.is_human_readable() {
                let mut map = BTreeMap::<String, String>::deserialize(deserializer)?;
                Ok(Self {
                    build: map.remove("build"),
                })
            } else {
                let mut map = BTreeMap::<i64, String>::deserialize(deserializer)?;
                Ok(Self {
                    build: map.remove(&-70000),
                })
            }
        }
    }

    impl Extension for Firmware {
        fn validate(&self, _host: Host<'_>) -> Result<()> {
            match &self.build {
                Some(b) if b.is_empty() => Err(Error::custom("empty build")),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn test_extension_point_names() {
        for point in ExtensionPoint::ALL {
            assert_eq!(point.name().parse::<ExtensionPoint>().unwrap(), point);
        }

        let err = "Foo".parse::<ExtensionPoint>().err().unwrap();
        assert_eq!(err.to_string(), "unexpected extension point: Foo");
    }

    #[test]
    fn test_slot_entries() {
        let mut slot = Extensions::default();
        assert!(slot.is_empty());
        assert_eq!(slot, Extensions::new(Box::new(Firmware::default())));

        slot.set(Box::new(Firmware {
            build: Some("b1".to_string()),
        }));
        assert!(!slot.is_empty());
        assert_eq!(
            slot.cbor_entries().unwrap(),
            vec![(
                CborValue::Integer((-70000).into()),
                CborValue::Text("b1".to_string())
            )]
        );
        assert_eq!(
            slot.json_entries().unwrap(),
            vec![("build".to_string(), JsonValue::from("b1"))]
        );
        assert_eq!(slot.get::<Firmware>().unwrap().build.as_deref(), Some("b1"));

        slot.get_mut::<Firmware>().unwrap().build = Some(String::new());
        let mval = Mval::default();
        assert_eq!(
            slot.validate(Host::Mval(&mval)).err().unwrap().to_string(),
            "empty build"
        );
    }

    #[test]
    fn test_decode_into_attached_slot() {
        let mut slot = Extensions::new(Box::new(Firmware::default()));
        slot.decode_cbor(
            ExtensionPoint::Mval,
            vec![(
                CborValue::Integer((-70000).into()),
                CborValue::Text("b2".to_string()),
            )],
        )
        .unwrap();

        assert_eq!(slot.get::<Firmware>().unwrap().build.as_deref(), Some("b2"));
    }

    #[test]
    fn test_extensions_map_check() {
        let exts = ExtensionsMap::new()
            .with(ExtensionPoint::Mval, Firmware::default())
            .with(ExtensionPoint::Comid, Firmware::default());

        let err = exts
            .check(&[ExtensionPoint::Mval, ExtensionPoint::Flags])
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "unexpected extension point: Comid");

        let sub = exts.subset(&[ExtensionPoint::Mval]);
        assert!(sub.get(ExtensionPoint::Mval).is_some());
        assert!(sub.get(ExtensionPoint::Comid).is_none());
        sub.check(&[ExtensionPoint::Mval]).unwrap();
    }
}
