// SPDX-License-Identifier: MIT

//! Measurements: a key identifying what was measured and the measured values.
//!
//! ```text
//! measurement-map = { ? 0 => $measured-element-type-choice,
//!                     1 => measurement-values-map,
//!                     ? 2 => [ + $crypto-key-type-choice ] }
//! ```
//!
//! [`Mval`] is the measurement-values map. All of its fields are optional but
//! at least one must be present:
//!
//! | Key | Field | JSON name |
//! |---|---|---|
//! | 0 | version | `version` |
//! | 1 | svn | `svn` |
//! | 2 | digests | `digests` |
//! | 3 | flags | `flags` |
//! | 4 | raw value | `raw-value` |
//! | 5 | raw value mask | `raw-value-mask` |
//! | 6 | MAC address | `mac-addr` |
//! | 7 | IP address | `ip-addr` |
//! | 8 | serial number | `serial-number` |
//! | 9 | UEID | `ueid` |
//! | 10 | UUID | `uuid` |
//! | 11 | name | `name` |
//! | 13 | crypto keys | `cryptokeys` |
//! | 14 | integrity registers | `integrity-registers` |
//! | 15 | raw integer | `raw-int` |
//!
//! Extension entries follow the built-in keys.

use std::{fmt::Display, marker::PhantomData};

use ciborium::Value as CborValue;
use serde::{
    de::{self, Visitor},
    ser::{self, SerializeMap},
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value as JsonValue;

use crate::{
    choice::{
        bytes_factory, int_factory, oid_factory, uint_factory, uuid_factory, ChoiceInput,
        ChoiceValue, Registry, TypeChoice, BYTES_TAG, OID_TAG, UUID_TAG,
    },
    extensions::{ExtensionPoint, Extensions, ExtensionsMap, Host},
    macros::{choice_kind, map_len},
    profiles::{
        cca_platform_config_id_factory, cca_refval_id_factory, psa_refval_id_factory,
        CcaPlatformConfigId, CcaRefValId, PsaRefValId, CCA_PLATFORM_CONFIG_ID_TAG,
        CCA_REFVAL_ID_TAG, PSA_REFVAL_ID_TAG,
    },
    Bytes, ChoiceError, CoreError, CryptoKey, Digests, Error, ExtensionError, HashEntry, Int,
    IntegrityRegisters, IpAddr, MacAddr, Oid, RegisterIndex, Result, TaggedBytes, TriplesError,
    Ueid, Uint, Uuid, Validate,
};

choice_kind!(
    /// Marker for measurement keys.
    MkeyKind,
    "measurement key",
    Registry::new()
        .with::<Uint>(None, uint_factory)
        .with::<Oid>(Some(OID_TAG), oid_factory)
        .with::<Uuid>(Some(UUID_TAG), uuid_factory)
        .with::<PsaRefValId>(Some(PSA_REFVAL_ID_TAG), psa_refval_id_factory)
        .with::<CcaPlatformConfigId>(Some(CCA_PLATFORM_CONFIG_ID_TAG), cca_platform_config_id_factory)
        .with::<CcaRefValId>(Some(CCA_REFVAL_ID_TAG), cca_refval_id_factory)
);

/// Identifies the measured element within an environment.
pub type Mkey = TypeChoice<MkeyKind>;

pub const EXACT_SVN_TAG: u64 = 552;
pub const MIN_SVN_TAG: u64 = 553;

/// A security version number that must match exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExactSvn(pub u64);

impl Validate for ExactSvn {
    fn valid(&self) -> Result<()> {
        Ok(())
    }
}

impl ChoiceValue for ExactSvn {
    fn type_name(&self) -> &'static str {
        "exact-value"
    }
}

/// A lower bound on the security version number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinSvn(pub u64);

impl Validate for MinSvn {
    fn valid(&self) -> Result<()> {
        Ok(())
    }
}

impl ChoiceValue for MinSvn {
    fn type_name(&self) -> &'static str {
        "min-value"
    }
}

fn svn_from_input(input: ChoiceInput, type_name: &'static str) -> Result<u64> {
    match input {
        ChoiceInput::None => Ok(0),
        ChoiceInput::Uint(u) => Ok(u),
        ChoiceInput::Int(i) => u64::try_from(i).map_err(|_| {
            ChoiceError::UnexpectedInput {
                type_name,
                input: "negative int",
            }
            .into()
        }),
        ChoiceInput::Text(s) => s.parse::<u64>().map_err(|_| {
            ChoiceError::UnexpectedInput {
                type_name,
                input: "text",
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

pub fn exact_svn_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let svn = match input {
        ChoiceInput::Value(_) => input.into_value::<ExactSvn>("exact-value")?,
        other => ExactSvn(svn_from_input(other, "exact-value")?),
    };
    Ok(Box::new(svn))
}

pub fn min_svn_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let svn = match input {
        ChoiceInput::Value(_) => input.into_value::<MinSvn>("min-value")?,
        other => MinSvn(svn_from_input(other, "min-value")?),
    };
    Ok(Box::new(svn))
}

choice_kind!(
    /// Marker for security version numbers.
    SvnKind,
    "svn",
    Registry::new()
        .with::<ExactSvn>(Some(EXACT_SVN_TAG), exact_svn_factory)
        .with::<MinSvn>(Some(MIN_SVN_TAG), min_svn_factory)
);

/// Security version number.
pub type Svn = TypeChoice<SvnKind>;

impl TypeChoice<SvnKind> {
    /// Checks a claimed SVN against this reference SVN: an exact reference
    /// requires an equal exact claim, a minimum reference accepts any claim
    /// at or above it.
    pub fn matches(&self, claim: &Svn) -> bool {
        let claimed = match (claim.downcast_ref::<ExactSvn>(), claim.downcast_ref::<MinSvn>()) {
            (Some(exact), _) => exact.0,
            (None, Some(min)) => min.0,
            (None, None) => return false,
        };

        if let Some(exact) = self.downcast_ref::<ExactSvn>() {
            return claim.downcast_ref::<ExactSvn>().is_some() && claimed == exact.0;
        }
        if let Some(min) = self.downcast_ref::<MinSvn>() {
            return claimed >= min.0;
        }
        false
    }
}

choice_kind!(
    /// Marker for raw values.
    RawValueKind,
    "raw value",
    Registry::new().with::<TaggedBytes>(Some(BYTES_TAG), bytes_factory)
);

/// An opaque measured value.
pub type RawValue = TypeChoice<RawValueKind>;

pub const INT_RANGE_TAG: u64 = 564;

/// An inclusive integer range. An absent bound is unbounded.
///
/// Encoded as `[min / null, max / null]` in CBOR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IntRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl IntRange {
    pub fn new(min: Option<i64>, max: Option<i64>) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

impl Validate for IntRange {
    fn valid(&self) -> Result<()> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min > max => {
                Err(TriplesError::InvalidRange { min, max }.into())
            }
            _ => Ok(()),
        }
    }
}

impl ChoiceValue for IntRange {
    fn type_name(&self) -> &'static str {
        "range"
    }
}

impl Serialize for IntRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let mut map = serializer.serialize_map(Some(map_len!(self, 0, min, max)))?;
            if let Some(min) = &self.min {
                map.serialize_entry("min", min)?;
            }
            if let Some(max) = &self.max {
                map.serialize_entry("max", max)?;
            }
            map.end()
        } else {
            (self.min, self.max).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for IntRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            #[derive(Deserialize)]
            #[serde(deny_unknown_fields)]
            struct Repr {
                min: Option<i64>,
                max: Option<i64>,
            }

            let repr = Repr::deserialize(deserializer)?;
            Ok(Self {
                min: repr.min,
                max: repr.max,
            })
        } else {
            let (min, max) = <(Option<i64>, Option<i64>)>::deserialize(deserializer)?;
            Ok(Self { min, max })
        }
    }
}

pub fn int_range_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let range = match input {
        ChoiceInput::None => IntRange::default(),
        other => other.into_value::<IntRange>("range")?,
    };
    Ok(Box::new(range))
}

choice_kind!(
    /// Marker for raw integer values.
    RawIntKind,
    "raw int",
    Registry::new()
        .with::<Int>(None, int_factory)
        .with::<IntRange>(Some(INT_RANGE_TAG), int_range_factory)
);

/// A measured integer, or a range of acceptable integers.
pub type RawInt = TypeChoice<RawIntKind>;

impl TypeChoice<RawIntKind> {
    /// Checks a claimed integer against this reference.
    pub fn matches(&self, claim: i64) -> bool {
        if let Some(int) = self.downcast_ref::<Int>() {
            return int.0 == claim;
        }
        self.downcast_ref::<IntRange>()
            .is_some_and(|range| range.contains(claim))
    }
}

/// Version scheme codes from the SWID version-scheme registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionScheme(pub i64);

impl VersionScheme {
    pub const MULTIPART_NUMERIC: Self = Self(1);
    pub const MULTIPART_NUMERIC_SUFFIX: Self = Self(2);
    pub const ALPHANUMERIC: Self = Self(3);
    pub const DECIMAL: Self = Self(4);
    pub const SEMVER: Self = Self(16384);

    const NAMES: [(i64, &'static str); 5] = [
        (1, "multipartnumeric"),
        (2, "multipartnumeric+suffix"),
        (3, "alphanumeric"),
        (4, "decimal"),
        (16384, "semver"),
    ];

    pub fn name(self) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(code, _)| Self(*code))
    }
}

impl Display for VersionScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "version-scheme({})", self.0),
        }
    }
}

impl Serialize for VersionScheme {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.name() {
            Some(name) if serializer.is_human_readable() => serializer.serialize_str(name),
            _ => serializer.serialize_i64(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for VersionScheme {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct VersionSchemeVisitor;

        impl Visitor<'_> for VersionSchemeVisitor {
            type Value = VersionScheme;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a version scheme name or code")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                Ok(VersionScheme(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                i64::try_from(v)
                    .map(VersionScheme)
                    .map_err(|_| E::custom(format!("version scheme {v} out of range")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                VersionScheme::from_name(v).ok_or_else(|| {
                    E::custom(CoreError::Invalid {
                        what: "version scheme",
                        reason: format!("unknown name '{v}'"),
                    })
                })
            }
        }

        deserializer.deserialize_any(VersionSchemeVisitor)
    }
}

/// A version string with an optional scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Version {
    pub version: String,
    pub scheme: Option<VersionScheme>,
}

impl Version {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            scheme: None,
        }
    }

    pub fn with_scheme(mut self, scheme: VersionScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }
}

impl Validate for Version {
    fn valid(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(TriplesError::EmptyVersion.into());
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(map_len!(self, 1, scheme)))?;

        if is_human_readable {
            map.serialize_entry("value", &self.version)?;
            if let Some(scheme) = &self.scheme {
                map.serialize_entry("scheme", scheme)?;
            }
        } else {
            map.serialize_entry(&0, &self.version)?;
            if let Some(scheme) = &self.scheme {
                map.serialize_entry(&1, scheme)?;
            }
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct VersionVisitor {
            is_human_readable: bool,
            marker: PhantomData<Version>,
        }

        impl<'de> Visitor<'de> for VersionVisitor {
            type Value = Version;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing version fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut version = Version::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("value") => version.version = map.next_value()?,
                            Some("scheme") => version.scheme = Some(map.next_value()?),
                            Some(s) => {
                                return Err(de::Error::unknown_field(s, &["value", "scheme"]))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => version.version = map.next_value()?,
                            Some(1) => version.scheme = Some(map.next_value()?),
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

                Ok(version)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(VersionVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// Names of the built-in flags, in key order.
pub const FLAG_NAMES: [&str; 10] = [
    "is-configured",
    "is-secure",
    "is-recovery",
    "is-debug",
    "is-replay-protected",
    "is-integrity-protected",
    "is-runtime-measured",
    "is-immutable",
    "is-tcb",
    "is-confidentiality-protected",
];

/// Operational state flags. Each flag is either true, false or unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagsMap {
    pub is_configured: Option<bool>,
    pub is_secure: Option<bool>,
    pub is_recovery: Option<bool>,
    pub is_debug: Option<bool>,
    pub is_replay_protected: Option<bool>,
    pub is_integrity_protected: Option<bool>,
    pub is_runtime_measured: Option<bool>,
    pub is_immutable: Option<bool>,
    pub is_tcb: Option<bool>,
    pub is_confidentiality_protected: Option<bool>,
    pub extensions: Extensions,
}

impl FlagsMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn builtins(&self) -> [Option<bool>; 10] {
        [
            self.is_configured,
            self.is_secure,
            self.is_recovery,
            self.is_debug,
            self.is_replay_protected,
            self.is_integrity_protected,
            self.is_runtime_measured,
            self.is_immutable,
            self.is_tcb,
            self.is_confidentiality_protected,
        ]
    }

    fn builtin_mut(&mut self, key: usize) -> Option<&mut Option<bool>> {
        Some(match key {
            0 => &mut self.is_configured,
            1 => &mut self.is_secure,
            2 => &mut self.is_recovery,
            3 => &mut self.is_debug,
            4 => &mut self.is_replay_protected,
            5 => &mut self.is_integrity_protected,
            6 => &mut self.is_runtime_measured,
            7 => &mut self.is_immutable,
            8 => &mut self.is_tcb,
            9 => &mut self.is_confidentiality_protected,
            _ => return None,
        })
    }

    fn builtin_key(flag: &str) -> Option<usize> {
        FLAG_NAMES.iter().position(|name| *name == flag)
    }

    fn update(&mut self, flag: &str, value: Option<bool>) -> Result<()> {
        if let Some(slot) = Self::builtin_key(flag).and_then(|key| self.builtin_mut(key)) {
            *slot = value;
            return Ok(());
        }

        let known = match self.extensions.flags_mut() {
            Some(ext) => match value {
                Some(true) => ext.set_true(flag),
                Some(false) => ext.set_false(flag),
                None => ext.clear(flag),
            },
            None => false,
        };

        if known {
            Ok(())
        } else {
            Err(ExtensionError::UnknownFlag(flag.to_string()).into())
        }
    }

    /// Sets a built-in or extension flag to true.
    pub fn set_true(&mut self, flag: &str) -> Result<()> {
        self.update(flag, Some(true))
    }

    pub fn set_false(&mut self, flag: &str) -> Result<()> {
        self.update(flag, Some(false))
    }

    pub fn clear(&mut self, flag: &str) -> Result<()> {
        self.update(flag, None)
    }

    /// The state of a flag; unknown flags read as unset.
    pub fn get(&self, flag: &str) -> Option<bool> {
        match Self::builtin_key(flag) {
            Some(key) => self.builtins()[key],
            None => self.extensions.flags().and_then(|ext| ext.get(flag)),
        }
    }

    /// `true` if any built-in or extension flag is set.
    pub fn any_set(&self) -> bool {
        self.builtins().iter().any(Option::is_some)
            || self.extensions.flags().is_some_and(|ext| ext.any_set())
    }

    pub fn register_extensions(&mut self, exts: &ExtensionsMap) -> Result<()> {
        exts.check(&[ExtensionPoint::Flags])?;
        if let Some(ext) = exts.get(ExtensionPoint::Flags) {
            self.extensions.set(ext.box_clone());
        }
        Ok(())
    }
}

impl Validate for FlagsMap {
    fn valid(&self) -> Result<()> {
        self.extensions.validate(Host::Flags(self))
    }
}

impl Serialize for FlagsMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let builtins = self.builtins();
        let set = builtins.iter().filter(|f| f.is_some()).count();

        if is_human_readable {
            let ext = self.extensions.json_entries().map_err(ser::Error::custom)?;
            let mut map = serializer.serialize_map(Some(set + ext.len()))?;
            for (name, flag) in FLAG_NAMES.iter().zip(builtins) {
                if let Some(flag) = flag {
                    map.serialize_entry(name, &flag)?;
                }
            }
            for (k, v) in &ext {
                map.serialize_entry(k, v)?;
            }
            map.end()
        } else {
            let ext = self.extensions.cbor_entries().map_err(ser::Error::custom)?;
            let mut map = serializer.serialize_map(Some(set + ext.len()))?;
            for (key, flag) in builtins.iter().enumerate() {
                if let Some(flag) = flag {
                    map.serialize_entry(&key, flag)?;
                }
            }
            for (k, v) in &ext {
                map.serialize_entry(k, v)?;
            }
            map.end()
        }
    }
}

impl<'de> Deserialize<'de> for FlagsMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct FlagsMapVisitor {
            is_human_readable: bool,
            marker: PhantomData<FlagsMap>,
        }

        impl<'de> Visitor<'de> for FlagsMapVisitor {
            type Value = FlagsMap;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map of flags")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut flags = FlagsMap::default();

                if self.is_human_readable {
                    let mut unknown: Vec<(String, JsonValue)> = vec![];
                    while let Some(key) = map.next_key::<String>()? {
                        match FlagsMap::builtin_key(&key).and_then(|k| flags.builtin_mut(k)) {
                            Some(slot) => *slot = Some(map.next_value()?),
                            None => unknown.push((key, map.next_value()?)),
                        }
                    }
                    flags
                        .extensions
                        .decode_json(ExtensionPoint::Flags, unknown)
                        .map_err(de::Error::custom)?;
                } else {
                    let mut unknown: Vec<(CborValue, CborValue)> = vec![];
                    while let Some(key) = map.next_key::<i64>()? {
                        let slot = usize::try_from(key)
                            .ok()
                            .and_then(|k| flags.builtin_mut(k));
                        match slot {
                            Some(slot) => *slot = Some(map.next_value()?),
                            None => unknown.push((CborValue::from(key), map.next_value()?)),
                        }
                    }
                    flags
                        .extensions
                        .decode_cbor(ExtensionPoint::Flags, unknown)
                        .map_err(de::Error::custom)?;
                }

                Ok(flags)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(FlagsMapVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// The measured values of a [`Measurement`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mval {
    pub version: Option<Version>,
    pub svn: Option<Svn>,
    pub digests: Option<Digests>,
    pub flags: Option<FlagsMap>,
    pub raw_value: Option<RawValue>,
    pub raw_value_mask: Option<Bytes>,
    pub mac_addr: Option<MacAddr>,
    pub ip_addr: Option<IpAddr>,
    pub serial_number: Option<String>,
    pub ueid: Option<Ueid>,
    pub uuid: Option<Uuid>,
    pub name: Option<String>,
    pub cryptokeys: Option<Vec<CryptoKey>>,
    pub integrity_registers: Option<IntegrityRegisters>,
    pub raw_int: Option<RawInt>,
    pub extensions: Extensions,
}

impl Mval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_svn(mut self, svn: Svn) -> Self {
        self.svn = Some(svn);
        self
    }

    pub fn with_raw_value(mut self, raw_value: RawValue) -> Self {
        self.raw_value = Some(raw_value);
        self
    }

    pub fn with_mac_addr(mut self, mac_addr: MacAddr) -> Self {
        self.mac_addr = Some(mac_addr);
        self
    }

    pub fn with_ip_addr(mut self, ip_addr: IpAddr) -> Self {
        self.ip_addr = Some(ip_addr);
        self
    }

    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    pub fn with_ueid(mut self, ueid: Ueid) -> Self {
        self.ueid = Some(ueid);
        self
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_raw_int(mut self, raw_int: RawInt) -> Self {
        self.raw_int = Some(raw_int);
        self
    }

    pub fn add_digest(&mut self, entry: HashEntry) -> &mut Self {
        self.digests.get_or_insert_with(Digests::new).add(entry);
        self
    }

    pub fn add_cryptokey(&mut self, key: CryptoKey) -> &mut Self {
        self.cryptokeys.get_or_insert_with(Vec::new).push(key);
        self
    }

    pub fn add_integrity_register(
        &mut self,
        index: impl Into<RegisterIndex>,
        entry: HashEntry,
    ) -> &mut Self {
        self.integrity_registers
            .get_or_insert_with(IntegrityRegisters::new)
            .add_digest(index, entry);
        self
    }

    /// The flags map, created on first use.
    pub fn flags_mut(&mut self) -> &mut FlagsMap {
        self.flags.get_or_insert_with(FlagsMap::new)
    }

    fn encoded_flags(&self) -> Option<&FlagsMap> {
        self.flags.as_ref().filter(|f| f.any_set())
    }

    pub fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.svn.is_none()
            && self.digests.is_none()
            && self.encoded_flags().is_none()
            && self.raw_value.is_none()
            && self.raw_value_mask.is_none()
            && self.mac_addr.is_none()
            && self.ip_addr.is_none()
            && self.serial_number.is_none()
            && self.ueid.is_none()
            && self.uuid.is_none()
            && self.name.is_none()
            && self.cryptokeys.is_none()
            && self.integrity_registers.is_none()
            && self.raw_int.is_none()
            && self.extensions.is_empty()
    }

    /// Attaches the `Mval` and `Flags` entries of `exts`. Other points are
    /// rejected.
    pub fn register_extensions(&mut self, exts: &ExtensionsMap) -> Result<()> {
        exts.check(&[ExtensionPoint::Mval, ExtensionPoint::Flags])?;

        if let Some(ext) = exts.get(ExtensionPoint::Mval) {
            self.extensions.set(ext.box_clone());
        }
        if exts.get(ExtensionPoint::Flags).is_some() {
            self.flags_mut()
                .register_extensions(&exts.subset(&[ExtensionPoint::Flags]))?;
        }
        Ok(())
    }

    /// Attaches the process-wide extension registered for `point` when no
    /// extension is attached yet.
    pub(crate) fn attach_registered(&mut self, point: ExtensionPoint) -> Result<()> {
        self.extensions.attach_registered(point)
    }
}

impl Validate for Mval {
    fn valid(&self) -> Result<()> {
        if self.is_empty() {
            return Err(TriplesError::NoMeasurementValue.into());
        }

        if let Some(version) = &self.version {
            version
                .valid()
                .map_err(|e| Error::validation("version", e))?;
        }
        if let Some(svn) = &self.svn {
            svn.valid().map_err(|e| Error::validation("svn", e))?;
        }
        if let Some(digests) = &self.digests {
            digests
                .valid()
                .map_err(|e| Error::validation("digests", e))?;
        }
        if let Some(flags) = &self.flags {
            flags.valid().map_err(|e| Error::validation("flags", e))?;
        }
        if let Some(raw_value) = &self.raw_value {
            raw_value
                .valid()
                .map_err(|e| Error::validation("raw-value", e))?;
        }
        if self.raw_value_mask.is_some() && self.raw_value.is_none() {
            return Err(TriplesError::MaskWithoutRawValue.into());
        }
        if let Some(mac_addr) = &self.mac_addr {
            mac_addr
                .valid()
                .map_err(|e| Error::validation("mac-addr", e))?;
        }
        if let Some(ip_addr) = &self.ip_addr {
            ip_addr
                .valid()
                .map_err(|e| Error::validation("ip-addr", e))?;
        }
        if let Some(ueid) = &self.ueid {
            ueid.valid().map_err(|e| Error::validation("ueid", e))?;
        }
        if let Some(uuid) = &self.uuid {
            uuid.valid().map_err(|e| Error::validation("uuid", e))?;
        }
        if let Some(keys) = &self.cryptokeys {
            for (i, key) in keys.iter().enumerate() {
                key.valid().map_err(|e| {
                    Error::validation("cryptokeys", e.context(format!("key at index {i}")))
                })?;
            }
        }
        if let Some(registers) = &self.integrity_registers {
            registers
                .valid()
                .map_err(|e| Error::validation("integrity-registers", e))?;
        }
        if let Some(raw_int) = &self.raw_int {
            raw_int
                .valid()
                .map_err(|e| Error::validation("raw-int", e))?;
        }

        self.extensions.validate(Host::Mval(self))
    }
}

impl Serialize for Mval {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let flags = self.encoded_flags();
        let len = map_len!(
            self,
            flags.is_some() as usize,
            version,
            svn,
            digests,
            raw_value,
            raw_value_mask,
            mac_addr,
            ip_addr,
            serial_number,
            ueid,
            uuid,
            name,
            cryptokeys,
            integrity_registers,
            raw_int,
        );

        if is_human_readable {
            let ext = self.extensions.json_entries().map_err(ser::Error::custom)?;
            let mut map = serializer.serialize_map(Some(len + ext.len()))?;

            if let Some(v) = &self.version {
                map.serialize_entry("version", v)?;
            }
            if let Some(v) = &self.svn {
                map.serialize_entry("svn", v)?;
            }
            if let Some(v) = &self.digests {
                map.serialize_entry("digests", v)?;
            }
            if let Some(v) = flags {
                map.serialize_entry("flags", v)?;
            }
            if let Some(v) = &self.raw_value {
                map.serialize_entry("raw-value", v)?;
            }
            if let Some(v) = &self.raw_value_mask {
                map.serialize_entry("raw-value-mask", v)?;
            }
            if let Some(v) = &self.mac_addr {
                map.serialize_entry("mac-addr", v)?;
            }
            if let Some(v) = &self.ip_addr {
                map.serialize_entry("ip-addr", v)?;
            }
            if let Some(v) = &self.serial_number {
                map.serialize_entry("serial-number", v)?;
            }
            if let Some(v) = &self.ueid {
                map.serialize_entry("ueid", v)?;
            }
            if let Some(v) = &self.uuid {
                map.serialize_entry("uuid", v)?;
            }
            if let Some(v) = &self.name {
                map.serialize_entry("name", v)?;
            }
            if let Some(v) = &self.cryptokeys {
                map.serialize_entry("cryptokeys", v)?;
            }
            if let Some(v) = &self.integrity_registers {
                map.serialize_entry("integrity-registers", v)?;
            }
            if let Some(v) = &self.raw_int {
                map.serialize_entry("raw-int", v)?;
            }
            for (k, v) in &ext {
                map.serialize_entry(k, v)?;
            }

            map.end()
        } else {
            let ext = self.extensions.cbor_entries().map_err(ser::Error::custom)?;
            let mut map = serializer.serialize_map(Some(len + ext.len()))?;

            if let Some(v) = &self.version {
                map.serialize_entry(&0, v)?;
            }
            if let Some(v) = &self.svn {
                map.serialize_entry(&1, v)?;
            }
            if let Some(v) = &self.digests {
                map.serialize_entry(&2, v)?;
            }
            if let Some(v) = flags {
                map.serialize_entry(&3, v)?;
            }
            if let Some(v) = &self.raw_value {
                map.serialize_entry(&4, v)?;
            }
            if let Some(v) = &self.raw_value_mask {
                map.serialize_entry(&5, v)?;
            }
            if let Some(v) = &self.mac_addr {
                map.serialize_entry(&6, v)?;
            }
            if let Some(v) = &self.ip_addr {
                map.serialize_entry(&7, v)?;
            }
            if let Some(v) = &self.serial_number {
                map.serialize_entry(&8, v)?;
            }
            if let Some(v) = &self.ueid {
                map.serialize_entry(&9, v)?;
            }
            if let Some(v) = &self.uuid {
                map.serialize_entry(&10, v)?;
            }
            if let Some(v) = &self.name {
                map.serialize_entry(&11, v)?;
            }
            if let Some(v) = &self.cryptokeys {
                map.serialize_entry(&13, v)?;
            }
            if let Some(v) = &self.integrity_registers {
                map.serialize_entry(&14, v)?;
            }
            if let Some(v) = &self.raw_int {
                map.serialize_entry(&15, v)?;
            }
            for (k, v) in &ext {
                map.serialize_entry(k, v)?;
            }

            map.end()
        }
    }
}

impl<'de> Deserialize<'de> for Mval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MvalVisitor {
            is_human_readable: bool,
            marker: PhantomData<Mval>,
        }

        impl<'de> Visitor<'de> for MvalVisitor {
            type Value = Mval;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing measurement values")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut mval = Mval::default();

                if self.is_human_readable {
                    let mut unknown: Vec<(String, JsonValue)> = vec![];
                    while let Some(key) = map.next_key::<String>()? {
                        match key.as_str() {
                            "version" => mval.version = Some(map.next_value()?),
                            "svn" => mval.svn = Some(map.next_value()?),
                            "digests" => mval.digests = Some(map.next_value()?),
                            "flags" => mval.flags = Some(map.next_value()?),
                            "raw-value" => mval.raw_value = Some(map.next_value()?),
                            "raw-value-mask" => mval.raw_value_mask = Some(map.next_value()?),
                            "mac-addr" => mval.mac_addr = Some(map.next_value()?),
                            "ip-addr" => mval.ip_addr = Some(map.next_value()?),
                            "serial-number" => mval.serial_number = Some(map.next_value()?),
                            "ueid" => mval.ueid = Some(map.next_value()?),
                            "uuid" => mval.uuid = Some(map.next_value()?),
                            "name" => mval.name = Some(map.next_value()?),
                            "cryptokeys" => mval.cryptokeys = Some(map.next_value()?),
                            "integrity-registers" => {
                                mval.integrity_registers = Some(map.next_value()?)
                            }
                            "raw-int" => mval.raw_int = Some(map.next_value()?),
                            _ => unknown.push((key, map.next_value()?)),
                        }
                    }
                    mval.extensions
                        .decode_json(ExtensionPoint::Mval, unknown)
                        .map_err(de::Error::custom)?;
                } else {
                    let mut unknown: Vec<(CborValue, CborValue)> = vec![];
                    while let Some(key) = map.next_key::<i64>()? {
                        match key {
                            0 => mval.version = Some(map.next_value()?),
                            1 => mval.svn = Some(map.next_value()?),
                            2 => mval.digests = Some(map.next_value()?),
                            3 => mval.flags = Some(map.next_value()?),
                            4 => mval.raw_value = Some(map.next_value()?),
                            5 => mval.raw_value_mask = Some(map.next_value()?),
                            6 => mval.mac_addr = Some(map.next_value()?),
                            7 => mval.ip_addr = Some(map.next_value()?),
                            8 => mval.serial_number = Some(map.next_value()?),
                            9 => mval.ueid = Some(map.next_value()?),
                            10 => mval.uuid = Some(map.next_value()?),
                            11 => mval.name = Some(map.next_value()?),
                            13 => mval.cryptokeys = Some(map.next_value()?),
                            14 => mval.integrity_registers = Some(map.next_value()?),
                            15 => mval.raw_int = Some(map.next_value()?),
                            n => unknown.push((CborValue::from(n), map.next_value()?)),
                        }
                    }
                    mval.extensions
                        .decode_cbor(ExtensionPoint::Mval, unknown)
                        .map_err(de::Error::custom)?;
                }

                Ok(mval)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(MvalVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// A single measurement: what was measured, its values, and optionally the
/// keys authorized to assert it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Measurement {
    pub mkey: Option<Mkey>,
    pub mval: Mval,
    pub authorized_by: Option<Vec<CryptoKey>>,
}

impl Measurement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mkey(mut self, mkey: Mkey) -> Self {
        self.mkey = Some(mkey);
        self
    }

    pub fn with_mval(mut self, mval: Mval) -> Self {
        self.mval = mval;
        self
    }

    pub fn add_authorized_by(&mut self, key: CryptoKey) -> &mut Self {
        self.authorized_by.get_or_insert_with(Vec::new).push(key);
        self
    }

    pub fn register_extensions(&mut self, exts: &ExtensionsMap) -> Result<()> {
        self.mval.register_extensions(exts)
    }
}

impl Validate for Measurement {
    fn valid(&self) -> Result<()> {
        if let Some(mkey) = &self.mkey {
            mkey.valid()
                .map_err(|e| Error::validation("measurement key", e))?;
        }

        self.mval
            .valid()
            .map_err(|e| Error::validation("measurement values", e))?;

        if let Some(keys) = &self.authorized_by {
            if keys.is_empty() {
                return Err(Error::validation("authorized-by", TriplesError::NoKeys));
            }
            for (i, key) in keys.iter().enumerate() {
                key.valid().map_err(|e| {
                    Error::validation("authorized-by", e.context(format!("key at index {i}")))
                })?;
            }
        }

        Ok(())
    }
}

impl Serialize for Measurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(map_len!(self, 1, mkey, authorized_by)))?;

        if is_human_readable {
            if let Some(mkey) = &self.mkey {
                map.serialize_entry("key", mkey)?;
            }
            map.serialize_entry("value", &self.mval)?;
            if let Some(keys) = &self.authorized_by {
                map.serialize_entry("authorized-by", keys)?;
            }
        } else {
            if let Some(mkey) = &self.mkey {
                map.serialize_entry(&0, mkey)?;
            }
            map.serialize_entry(&1, &self.mval)?;
            if let Some(keys) = &self.authorized_by {
                map.serialize_entry(&2, keys)?;
            }
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for Measurement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MeasurementVisitor {
            is_human_readable: bool,
            marker: PhantomData<Measurement>,
        }

        impl<'de> Visitor<'de> for MeasurementVisitor {
            type Value = Measurement;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing measurement fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut measurement = Measurement::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("key") => measurement.mkey = Some(map.next_value()?),
                            Some("value") => measurement.mval = map.next_value()?,
                            Some("authorized-by") => {
                                measurement.authorized_by = Some(map.next_value()?)
                            }
                            Some(s) => {
                                return Err(de::Error::unknown_field(
                                    s,
                                    &["key", "value", "authorized-by"],
                                ))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => measurement.mkey = Some(map.next_value()?),
                            Some(1) => measurement.mval = map.next_value()?,
                            Some(2) => measurement.authorized_by = Some(map.next_value()?),
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

                Ok(measurement)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(MeasurementVisitor {
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

    fn sample_mval() -> Mval {
        let mut mval = Mval::new()
            .with_version(Version::new("1.0.0").with_scheme(VersionScheme::SEMVER))
            .with_svn(Svn::new(2u64, "exact-value").unwrap());
        mval.add_digest(HashEntry::new(
            HashAlgorithm::Sha256_32,
            vec![0xde, 0xad, 0xbe, 0xef],
        ));
        mval.flags_mut().set_false("is-debug").unwrap();
        mval
    }

    #[test]
    fn test_mval_serde() {
        SerdeTestCase {
            value: sample_mval(),
            expected_json: concat!(
                r#"{"version":{"value":"1.0.0","scheme":"semver"},"#,
                r#""svn":{"type":"exact-value","value":2},"#,
                r#""digests":["sha-256-32;3q2+7w=="],"flags":{"is-debug":false}}"#,
            ),
            expected_cbor: vec![
                0xa4, // map(4)
                  0x00, // key: 0 [version]
                  0xa2, // map(2)
                    0x00, // key: 0
                    0x65, // tstr(5)
                      0x31, 0x2e, 0x30, 0x2e, 0x30, // "1.0.0"
                    0x01, // key: 1 [scheme]
                    0x19, 0x40, 0x00, // 16384
                  0x01, // key: 1 [svn]
                  0xd9, 0x02, 0x28, // tag(552)
                    0x02,
                  0x02, // key: 2 [digests]
                  0x81, // array(1)
                    0x82, // array(2)
                      0x06, // sha-256-32
                      0x44, // bstr(4)
                        0xde, 0xad, 0xbe, 0xef,
                  0x03, // key: 3 [flags]
                  0xa1, // map(1)
                    0x03, // key: 3 [is-debug]
                    0xf4, // false
            ],
        }
        .run();
    }

    #[test]
    fn test_mval_elides_unset_flags() {
        let mut mval = Mval::new().with_name("BL");
        mval.flags_mut();
        mval.valid().unwrap();

        let mut actual_cbor: Vec<u8> = vec![];
        ciborium::into_writer(&mval, &mut actual_cbor).unwrap();

        let expected_cbor: Vec<u8> = vec![
            0xa1, // map(1)
              0x0b, // key: 11 [name]
              0x62, // tstr(2)
                0x42, 0x4c, // "BL"
        ];
        assert_eq!(actual_cbor, expected_cbor);

        let json = serde_json::to_string(&mval).unwrap();
        assert_eq!(json, r#"{"name":"BL"}"#);

        let only_flags = Mval {
            flags: Some(FlagsMap::default()),
            ..Default::default()
        };
        assert_eq!(
            only_flags.valid().err().unwrap().to_string(),
            "no measurement value set"
        );
    }

    #[test]
    fn test_mval_validation() {
        let mval = Mval::new().with_mac_addr(MacAddr(vec![0x00; 5]));
        assert_eq!(
            mval.valid().err().unwrap().to_string(),
            "mac-addr validation failed: invalid MAC address length: expected 6 or 8 bytes, got 5"
        );

        let mval = Mval {
            raw_value_mask: Some(Bytes(vec![0xff])),
            ..Default::default()
        };
        assert_eq!(
            mval.valid().err().unwrap().to_string(),
            "raw-value-mask set without raw-value"
        );

        let mval = Mval::new().with_version(Version::new(""));
        assert_eq!(
            mval.valid().err().unwrap().to_string(),
            "version validation failed: empty version"
        );

        let measurement = Measurement::new().with_mval(Mval::new());
        assert_eq!(
            measurement.valid().err().unwrap().to_string(),
            "measurement values validation failed: no measurement value set"
        );
    }

    #[test]
    fn test_flags_unknown() {
        let mut flags = FlagsMap::new();
        flags.set_true("is-tcb").unwrap();
        assert_eq!(flags.get("is-tcb"), Some(true));
        assert!(flags.any_set());

        flags.clear("is-tcb").unwrap();
        assert!(!flags.any_set());

        let err = flags.set_true("is-frobbed").err().unwrap();
        assert_eq!(err.to_string(), "unknown flag is-frobbed");
        assert_eq!(flags.get("is-frobbed"), None);
    }

    #[test]
    fn test_raw_int() {
        let range = RawInt::from_value(IntRange::new(Some(1), None));

        SerdeTestCase {
            value: range.clone(),
            expected_json: r#"{"type":"range","value":{"min":1}}"#,
            expected_cbor: vec![
                0xd9, 0x02, 0x34, // tag(564)
                  0x82, // array(2)
                    0x01,
                    0xf6, // null
            ],
        }
        .run();

        assert!(range.matches(7));
        assert!(!range.matches(0));
        assert!(RawInt::new(-3i64, "int").unwrap().matches(-3));

        let bad = RawInt::from_value(IntRange::new(Some(5), Some(1)));
        assert_eq!(
            bad.valid().err().unwrap().to_string(),
            "invalid range: invalid range: min 5 is greater than max 1"
        );
    }

    #[test]
    fn test_svn_matches() {
        let exact = Svn::new(3u64, "exact-value").unwrap();
        let min = Svn::new(3u64, "min-value").unwrap();

        assert!(exact.matches(&Svn::new(3u64, "exact-value").unwrap()));
        assert!(!exact.matches(&Svn::new(4u64, "exact-value").unwrap()));
        assert!(min.matches(&Svn::new(4u64, "exact-value").unwrap()));
        assert!(!min.matches(&Svn::new(2u64, "exact-value").unwrap()));
    }

    #[test]
    fn test_measurement_serde() {
        let measurement = Measurement::new()
            .with_mkey(Mkey::new(1u64, "uint").unwrap())
            .with_mval(Mval::new().with_name("BL"));

        SerdeTestCase {
            value: measurement,
            expected_json: r#"{"key":{"type":"uint","value":1},"value":{"name":"BL"}}"#,
            expected_cbor: vec![
                0xa2, // map(2)
                  0x00, // key: 0 [mkey]
                  0x01, // uint 1
                  0x01, // key: 1 [mval]
                  0xa1, // map(1)
                    0x0b, // key: 11 [name]
                    0x62, // tstr(2)
                      0x42, 0x4c, // "BL"
            ],
        }
        .run();
    }
}
