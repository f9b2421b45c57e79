// SPDX-License-Identifier: MIT

//! Triples: the claims a CoMID makes about its environments.
//!
//! ```text
//! triples-map = {
//!   ? 0 => [ + reference-triple-record ]
//!   ? 1 => [ + endorsed-triple-record ]
//!   ? 2 => [ + attest-key-triple-record ]
//!   ? 3 => [ + identity-triple-record ]
//!   ? 8 => [ + conditional-endorsement-series-triple-record ]
//!   * $$triples-map-extension
//! }
//! ```
//!
//! Every record is a two element array in CBOR and a named object in JSON.

use std::marker::PhantomData;

use ciborium::Value as CborValue;
use serde::{
    de::{self, SeqAccess, Visitor},
    ser::{self, SerializeMap, SerializeSeq},
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value as JsonValue;

use crate::{
    empty::is_present,
    environment::Environment,
    extensions::{Extension, ExtensionPoint, Extensions, ExtensionsMap, Host},
    measurement::Measurement,
    CryptoKey, Error, Result, TriplesError, Validate,
};

const VALUE_POINTS: [ExtensionPoint; 2] = [ExtensionPoint::Mval, ExtensionPoint::Flags];

fn valid_measurements(measurements: &[Measurement]) -> Result<()> {
    if measurements.is_empty() {
        return Err(TriplesError::NoMeasurements.into());
    }
    for (i, m) in measurements.iter().enumerate() {
        m.valid()
            .map_err(|e| e.context(format!("measurement at index {i}")))?;
    }
    Ok(())
}

/// Attaches the common measurement-value extensions, then the one specific to
/// the enclosing triple.
fn register_value_extensions(
    measurements: &mut [Measurement],
    specific: Option<&dyn Extension>,
    exts: &ExtensionsMap,
) -> Result<()> {
    let common = exts.subset(&VALUE_POINTS);
    for m in measurements {
        m.register_extensions(&common)?;
        if let Some(ext) = specific {
            m.mval.extensions.set(ext.box_clone());
        }
    }
    Ok(())
}

fn attach_registered(measurements: &mut [Measurement], point: ExtensionPoint) -> Result<()> {
    for m in measurements {
        m.mval.attach_registered(point)?;
    }
    Ok(())
}

/// An environment together with measurements of it. Used for both reference
/// values and endorsed values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueTriple {
    pub environment: Environment,
    pub measurements: Vec<Measurement>,
}

impl ValueTriple {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            measurements: vec![],
        }
    }

    pub fn add_measurement(&mut self, measurement: Measurement) -> &mut Self {
        self.measurements.push(measurement);
        self
    }
}

impl Validate for ValueTriple {
    fn valid(&self) -> Result<()> {
        self.environment
            .valid()
            .map_err(|e| Error::validation("environment", e))?;
        valid_measurements(&self.measurements)
    }
}

impl Serialize for ValueTriple {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("environment", &self.environment)?;
            map.serialize_entry("measurements", &self.measurements)?;
            map.end()
        } else {
            let mut seq = serializer.serialize_seq(Some(2))?;
            seq.serialize_element(&self.environment)?;
            seq.serialize_element(&self.measurements)?;
            seq.end()
        }
    }
}

impl<'de> Deserialize<'de> for ValueTriple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ValueTripleVisitor;

        impl<'de> Visitor<'de> for ValueTripleVisitor {
            type Value = ValueTriple;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an environment and its measurements")
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let environment = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let measurements = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;

                Ok(ValueTriple {
                    environment,
                    measurements,
                })
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut triple = ValueTriple::default();

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "environment" => triple.environment = map.next_value()?,
                        "measurements" => triple.measurements = map.next_value()?,
                        s => {
                            return Err(de::Error::unknown_field(
                                s,
                                &["environment", "measurements"],
                            ))
                        }
                    }
                }

                Ok(triple)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_map(ValueTripleVisitor)
        } else {
            deserializer.deserialize_seq(ValueTripleVisitor)
        }
    }
}

/// An environment together with keys bound to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyTriple {
    pub environment: Environment,
    pub keys: Vec<CryptoKey>,
}

impl KeyTriple {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            keys: vec![],
        }
    }

    pub fn add_key(&mut self, key: CryptoKey) -> &mut Self {
        self.keys.push(key);
        self
    }
}

impl Validate for KeyTriple {
    fn valid(&self) -> Result<()> {
        self.environment
            .valid()
            .map_err(|e| Error::validation("environment", e))?;

        if self.keys.is_empty() {
            return Err(TriplesError::NoKeys.into());
        }
        for (i, key) in self.keys.iter().enumerate() {
            key.valid()
                .map_err(|e| e.context(format!("key at index {i}")))?;
        }
        Ok(())
    }
}

impl Serialize for KeyTriple {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("environment", &self.environment)?;
            map.serialize_entry("verification-keys", &self.keys)?;
            map.end()
        } else {
            let mut seq = serializer.serialize_seq(Some(2))?;
            seq.serialize_element(&self.environment)?;
            seq.serialize_element(&self.keys)?;
            seq.end()
        }
    }
}

impl<'de> Deserialize<'de> for KeyTriple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct KeyTripleVisitor;

        impl<'de> Visitor<'de> for KeyTripleVisitor {
            type Value = KeyTriple;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an environment and its keys")
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let environment = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let keys = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;

                Ok(KeyTriple { environment, keys })
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut triple = KeyTriple::default();

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "environment" => triple.environment = map.next_value()?,
                        "verification-keys" => triple.keys = map.next_value()?,
                        s => {
                            return Err(de::Error::unknown_field(
                                s,
                                &["environment", "verification-keys"],
                            ))
                        }
                    }
                }

                Ok(triple)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_map(KeyTripleVisitor)
        } else {
            deserializer.deserialize_seq(KeyTripleVisitor)
        }
    }
}

/// One step of a conditional endorsement series: when every `selection`
/// measurement matches, the `addition` measurements are endorsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesRecord {
    pub selection: Vec<Measurement>,
    pub addition: Vec<Measurement>,
}

impl SeriesRecord {
    pub fn new(selection: Vec<Measurement>, addition: Vec<Measurement>) -> Self {
        Self {
            selection,
            addition,
        }
    }

    fn measurements_mut(&mut self) -> impl Iterator<Item = &mut Measurement> {
        self.selection.iter_mut().chain(self.addition.iter_mut())
    }
}

impl Validate for SeriesRecord {
    fn valid(&self) -> Result<()> {
        valid_measurements(&self.selection).map_err(|e| Error::validation("selection", e))?;
        valid_measurements(&self.addition).map_err(|e| Error::validation("addition", e))
    }
}

impl Serialize for SeriesRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("selection", &self.selection)?;
            map.serialize_entry("addition", &self.addition)?;
            map.end()
        } else {
            (&self.selection, &self.addition).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for SeriesRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            #[derive(Deserialize)]
            #[serde(deny_unknown_fields)]
            struct Repr {
                selection: Vec<Measurement>,
                addition: Vec<Measurement>,
            }

            let repr = Repr::deserialize(deserializer)?;
            Ok(Self::new(repr.selection, repr.addition))
        } else {
            let (selection, addition) = <(Vec<Measurement>, Vec<Measurement>)>::deserialize(deserializer)?;
            Ok(Self::new(selection, addition))
        }
    }
}

/// A stateful environment followed by an ordered series of conditional
/// endorsements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CondEndorseSeriesTriple {
    pub condition: ValueTriple,
    pub series: Vec<SeriesRecord>,
}

impl CondEndorseSeriesTriple {
    pub fn new(condition: ValueTriple) -> Self {
        Self {
            condition,
            series: vec![],
        }
    }

    pub fn add_series(&mut self, record: SeriesRecord) -> &mut Self {
        self.series.push(record);
        self
    }

    fn measurements_mut(&mut self) -> impl Iterator<Item = &mut Measurement> {
        self.condition
            .measurements
            .iter_mut()
            .chain(self.series.iter_mut().flat_map(SeriesRecord::measurements_mut))
    }
}

impl Validate for CondEndorseSeriesTriple {
    fn valid(&self) -> Result<()> {
        self.condition
            .valid()
            .map_err(|e| Error::validation("condition", e))?;

        if self.series.is_empty() {
            return Err(TriplesError::NoSeries.into());
        }
        for (i, record) in self.series.iter().enumerate() {
            record
                .valid()
                .map_err(|e| e.context(format!("series record at index {i}")))?;
        }
        Ok(())
    }
}

impl Serialize for CondEndorseSeriesTriple {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("condition", &self.condition)?;
            map.serialize_entry("series", &self.series)?;
            map.end()
        } else {
            (&self.condition, &self.series).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for CondEndorseSeriesTriple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            #[derive(Deserialize)]
            #[serde(deny_unknown_fields)]
            struct Repr {
                condition: ValueTriple,
                series: Vec<SeriesRecord>,
            }

            let repr = Repr::deserialize(deserializer)?;
            Ok(Self {
                condition: repr.condition,
                series: repr.series,
            })
        } else {
            let (condition, series) =
                <(ValueTriple, Vec<SeriesRecord>)>::deserialize(deserializer)?;
            Ok(Self { condition, series })
        }
    }
}

/// The triples of a CoMID. At least one list must be non-empty.
#[derive(Debug, Clone, Default)]
pub struct Triples {
    pub reference_values: Option<Vec<ValueTriple>>,
    pub endorsed_values: Option<Vec<ValueTriple>>,
    pub attester_verification_keys: Option<Vec<KeyTriple>>,
    pub dev_identity_keys: Option<Vec<KeyTriple>>,
    pub cond_endorse_series: Option<Vec<CondEndorseSeriesTriple>>,
    pub extensions: Extensions,
    /// Measurement-level extensions applied to triples added later.
    value_extensions: ExtensionsMap,
}

impl PartialEq for Triples {
    fn eq(&self, other: &Self) -> bool {
        self.reference_values == other.reference_values
            && self.endorsed_values == other.endorsed_values
            && self.attester_verification_keys == other.attester_verification_keys
            && self.dev_identity_keys == other.dev_identity_keys
            && self.cond_endorse_series == other.cond_endorse_series
            && self.extensions == other.extensions
    }
}

impl Eq for Triples {}

impl Triples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reference_value(&mut self, mut triple: ValueTriple) -> Result<&mut Self> {
        register_value_extensions(
            &mut triple.measurements,
            self.value_extensions.get(ExtensionPoint::ReferenceValue),
            &self.value_extensions,
        )?;
        self.reference_values.get_or_insert_with(Vec::new).push(triple);
        Ok(self)
    }

    pub fn add_endorsed_value(&mut self, mut triple: ValueTriple) -> Result<&mut Self> {
        register_value_extensions(
            &mut triple.measurements,
            self.value_extensions.get(ExtensionPoint::EndorsedValue),
            &self.value_extensions,
        )?;
        self.endorsed_values.get_or_insert_with(Vec::new).push(triple);
        Ok(self)
    }

    pub fn add_attester_verification_key(&mut self, triple: KeyTriple) -> &mut Self {
        self.attester_verification_keys
            .get_or_insert_with(Vec::new)
            .push(triple);
        self
    }

    pub fn add_dev_identity_key(&mut self, triple: KeyTriple) -> &mut Self {
        self.dev_identity_keys
            .get_or_insert_with(Vec::new)
            .push(triple);
        self
    }

    pub fn add_cond_endorse_series(
        &mut self,
        mut triple: CondEndorseSeriesTriple,
    ) -> Result<&mut Self> {
        let specific = self
            .value_extensions
            .get(ExtensionPoint::CondEndorseSeriesValue);
        let common = self.value_extensions.subset(&VALUE_POINTS);
        for m in triple.measurements_mut() {
            m.register_extensions(&common)?;
            if let Some(ext) = specific {
                m.mval.extensions.set(ext.box_clone());
            }
        }
        self.cond_endorse_series
            .get_or_insert_with(Vec::new)
            .push(triple);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        !is_present(&self.reference_values)
            && !is_present(&self.endorsed_values)
            && !is_present(&self.attester_verification_keys)
            && !is_present(&self.dev_identity_keys)
            && !is_present(&self.cond_endorse_series)
            && self.extensions.is_empty()
    }

    /// Attaches `exts` to this container and to every measurement value it
    /// holds, now and in triples added afterwards.
    ///
    /// Accepted points: `Triples`, `ReferenceValue`, `EndorsedValue`,
    /// `CondEndorseSeriesValue`, `Mval` and `Flags`.
    pub fn register_extensions(&mut self, exts: &ExtensionsMap) -> Result<()> {
        exts.check(&[
            ExtensionPoint::Triples,
            ExtensionPoint::ReferenceValue,
            ExtensionPoint::EndorsedValue,
            ExtensionPoint::CondEndorseSeriesValue,
            ExtensionPoint::Mval,
            ExtensionPoint::Flags,
        ])?;

        if let Some(ext) = exts.get(ExtensionPoint::Triples) {
            self.extensions.set(ext.box_clone());
        }

        for (point, ext) in exts.iter() {
            if point != ExtensionPoint::Triples {
                self.value_extensions.insert(point, ext.box_clone());
            }
        }

        let value_exts = &self.value_extensions;
        for triple in self.reference_values.iter_mut().flatten() {
            register_value_extensions(
                &mut triple.measurements,
                value_exts.get(ExtensionPoint::ReferenceValue),
                value_exts,
            )?;
        }
        for triple in self.endorsed_values.iter_mut().flatten() {
            register_value_extensions(
                &mut triple.measurements,
                value_exts.get(ExtensionPoint::EndorsedValue),
                value_exts,
            )?;
        }

        let specific = value_exts.get(ExtensionPoint::CondEndorseSeriesValue);
        let common = value_exts.subset(&VALUE_POINTS);
        for triple in self.cond_endorse_series.iter_mut().flatten() {
            for m in triple.measurements_mut() {
                m.register_extensions(&common)?;
                if let Some(ext) = specific {
                    m.mval.extensions.set(ext.box_clone());
                }
            }
        }

        Ok(())
    }

    /// Binds process-wide triple-specific extensions to decoded measurement
    /// values.
    fn attach_registered(&mut self) -> Result<()> {
        for triple in self.reference_values.iter_mut().flatten() {
            attach_registered(&mut triple.measurements, ExtensionPoint::ReferenceValue)?;
        }
        for triple in self.endorsed_values.iter_mut().flatten() {
            attach_registered(&mut triple.measurements, ExtensionPoint::EndorsedValue)?;
        }
        for triple in self.cond_endorse_series.iter_mut().flatten() {
            for m in triple.measurements_mut() {
                m.mval
                    .attach_registered(ExtensionPoint::CondEndorseSeriesValue)?;
            }
        }
        Ok(())
    }
}

fn valid_list<T: Validate>(list: &Option<Vec<T>>, what: &str) -> Result<()> {
    for (i, triple) in list.iter().flatten().enumerate() {
        triple
            .valid()
            .map_err(|e| e.context(format!("{what} at index {i}")))?;
    }
    Ok(())
}

impl Validate for Triples {
    fn valid(&self) -> Result<()> {
        if self.is_empty() {
            return Err(TriplesError::EmptyTriples.into());
        }

        valid_list(&self.reference_values, "reference value")?;
        valid_list(&self.endorsed_values, "endorsed value")?;
        valid_list(
            &self.attester_verification_keys,
            "attester verification key",
        )?;
        valid_list(&self.dev_identity_keys, "device identity key")?;
        valid_list(
            &self.cond_endorse_series,
            "conditional endorsement series",
        )?;

        self.extensions.validate(Host::Triples(self))
    }
}

impl Serialize for Triples {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let is_human_readable = serializer.is_human_readable();
        let len = [
            is_present(&self.reference_values),
            is_present(&self.endorsed_values),
            is_present(&self.attester_verification_keys),
            is_present(&self.dev_identity_keys),
            is_present(&self.cond_endorse_series),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();

        if is_human_readable {
            let ext = self.extensions.json_entries().map_err(ser::Error::custom)?;
            let mut map = serializer.serialize_map(Some(len + ext.len()))?;

            if is_present(&self.reference_values) {
                map.serialize_entry("reference-values", &self.reference_values)?;
            }
            if is_present(&self.endorsed_values) {
                map.serialize_entry("endorsed-values", &self.endorsed_values)?;
            }
            if is_present(&self.attester_verification_keys) {
                map.serialize_entry(
                    "attester-verification-keys",
                    &self.attester_verification_keys,
                )?;
            }
            if is_present(&self.dev_identity_keys) {
                map.serialize_entry("dev-identity-keys", &self.dev_identity_keys)?;
            }
            if is_present(&self.cond_endorse_series) {
                map.serialize_entry("conditional-endorsement-series", &self.cond_endorse_series)?;
            }
            for (k, v) in &ext {
                map.serialize_entry(k, v)?;
            }

            map.end()
        } else {
            let ext = self.extensions.cbor_entries().map_err(ser::Error::custom)?;
            let mut map = serializer.serialize_map(Some(len + ext.len()))?;

            if is_present(&self.reference_values) {
                map.serialize_entry(&0, &self.reference_values)?;
            }
            if is_present(&self.endorsed_values) {
                map.serialize_entry(&1, &self.endorsed_values)?;
            }
            if is_present(&self.attester_verification_keys) {
                map.serialize_entry(&2, &self.attester_verification_keys)?;
            }
            if is_present(&self.dev_identity_keys) {
                map.serialize_entry(&3, &self.dev_identity_keys)?;
            }
            if is_present(&self.cond_endorse_series) {
                map.serialize_entry(&8, &self.cond_endorse_series)?;
            }
            for (k, v) in &ext {
                map.serialize_entry(k, v)?;
            }

            map.end()
        }
    }
}

impl<'de> Deserialize<'de> for Triples {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TriplesVisitor {
            is_human_readable: bool,
            marker: PhantomData<Triples>,
        }

        impl<'de> Visitor<'de> for TriplesVisitor {
            type Value = Triples;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing triples")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut triples = Triples::default();

                if self.is_human_readable {
                    let mut unknown: Vec<(String, JsonValue)> = vec![];
                    while let Some(key) = map.next_key::<String>()? {
                        match key.as_str() {
                            "reference-values" => {
                                triples.reference_values = Some(map.next_value()?)
                            }
                            "endorsed-values" => triples.endorsed_values = Some(map.next_value()?),
                            "attester-verification-keys" => {
                                triples.attester_verification_keys = Some(map.next_value()?)
                            }
                            "dev-identity-keys" => {
                                triples.dev_identity_keys = Some(map.next_value()?)
                            }
                            "conditional-endorsement-series" => {
                                triples.cond_endorse_series = Some(map.next_value()?)
                            }
                            _ => unknown.push((key, map.next_value()?)),
                        }
                    }
                    triples
                        .extensions
                        .decode_json(ExtensionPoint::Triples, unknown)
                        .map_err(de::Error::custom)?;
                } else {
                    let mut unknown: Vec<(CborValue, CborValue)> = vec![];
                    while let Some(key) = map.next_key::<i64>()? {
                        match key {
                            0 => triples.reference_values = Some(map.next_value()?),
                            1 => triples.endorsed_values = Some(map.next_value()?),
                            2 => triples.attester_verification_keys = Some(map.next_value()?),
                            3 => triples.dev_identity_keys = Some(map.next_value()?),
                            8 => triples.cond_endorse_series = Some(map.next_value()?),
                            n => unknown.push((CborValue::from(n), map.next_value()?)),
                        }
                    }
                    triples
                        .extensions
                        .decode_cbor(ExtensionPoint::Triples, unknown)
                        .map_err(de::Error::custom)?;
                }

                triples.attach_registered().map_err(de::Error::custom)?;

                Ok(triples)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(TriplesVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

#[cfg(test)]
#[rustfmt::skip::macros(vec)]
mod tests {
    use super::*;
    use crate::{
        environment::{Class, ClassId},
        measurement::{Mkey, Mval},
        test::SerdeTestCase,
        Oid,
    };

    fn environment() -> Environment {
        Environment::new().with_class(
            Class::new().with_class_id(ClassId::from_value("1.2.3.4".parse::<Oid>().unwrap())),
        )
    }

    fn measurement() -> Measurement {
        Measurement::new()
            .with_mkey(Mkey::new(1u64, "uint").unwrap())
            .with_mval(Mval::new().with_name("BL"))
    }

    #[test]
    fn test_triples_serde() {
        let mut triple = ValueTriple::new(environment());
        triple.add_measurement(measurement());

        let mut triples = Triples::new();
        triples.add_reference_value(triple).unwrap();

        SerdeTestCase {
            value: triples,
            expected_json: concat!(
                r#"{"reference-values":[{"environment":{"class":{"id":"#,
                r#"{"type":"oid","value":"1.2.3.4"}}},"#,
                r#""measurements":[{"key":{"type":"uint","value":1},"#,
                r#""value":{"name":"BL"}}]}]}"#,
            ),
            expected_cbor: vec![
                0xa1, // map(1)
                  0x00, // key: 0 [reference-values]
                  0x81, // array(1)
                    0x82, // array(2) [reference triple]
                      0xa1, // map(1) [environment]
                        0x00, // key: 0 [class]
                        0xa1, // map(1)
                          0x00, // key: 0 [class-id]
                          0xd8, 0x6f, // tag(111)
                            0x43, // bstr(3)
                              0x2a, 0x03, 0x04,
                      0x81, // array(1)
                        0xa2, // map(2) [measurement]
                          0x00, // key: 0 [mkey]
                          0x01,
                          0x01, // key: 1 [mval]
                          0xa1, // map(1)
                            0x0b, // key: 11 [name]
                            0x62, // tstr(2)
                              0x42, 0x4c, // "BL"
            ],
        }
        .run();
    }

    #[test]
    fn test_triples_validation() {
        let err = Triples::new().valid().err().unwrap();
        assert_eq!(err.to_string(), "triples struct must not be empty");

        let triples = Triples {
            reference_values: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(
            triples.valid().err().unwrap().to_string(),
            "triples struct must not be empty"
        );

        let mut triples = Triples::new();
        triples
            .add_reference_value(ValueTriple::new(environment()))
            .unwrap();
        assert_eq!(
            triples.valid().err().unwrap().to_string(),
            "reference value at index 0: no measurement entries"
        );

        let mut triples = Triples::new();
        triples.add_attester_verification_key(KeyTriple::new(environment()));
        assert_eq!(
            triples.valid().err().unwrap().to_string(),
            "attester verification key at index 0: no keys"
        );

        let mut triple = ValueTriple::new(Environment::new());
        triple.add_measurement(measurement());
        assert_eq!(
            triple.valid().err().unwrap().to_string(),
            "environment validation failed: environment must not be empty"
        );
    }

    #[test]
    fn test_cond_endorse_series() {
        let mut condition = ValueTriple::new(environment());
        condition.add_measurement(measurement());

        let mut triple = CondEndorseSeriesTriple::new(condition);
        assert_eq!(
            triple.valid().err().unwrap().to_string(),
            "no series entries"
        );

        triple.add_series(SeriesRecord::new(vec![measurement()], vec![]));
        assert_eq!(
            triple.valid().err().unwrap().to_string(),
            "series record at index 0: addition validation failed: no measurement entries"
        );

        triple.series[0].addition.push(measurement());
        triple.valid().unwrap();

        let mut triples = Triples::new();
        triples.add_cond_endorse_series(triple).unwrap();
        triples.valid().unwrap();

        let mut cbor: Vec<u8> = vec![];
        ciborium::into_writer(&triples, &mut cbor).unwrap();
        assert_eq!(&cbor[..2], &[0xa1, 0x08]);

        let decoded: Triples = ciborium::from_reader(cbor.as_slice()).unwrap();
        assert_eq!(decoded, triples);

        let json = serde_json::to_string(&triples).unwrap();
        assert!(json.starts_with(r#"{"conditional-endorsement-series":[{"condition":"#));
        let decoded: Triples = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, triples);
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Marker {}

    impl Extension for Marker {}

    #[test]
    fn test_unexpected_extension_point() {
        let exts = ExtensionsMap::new().with(ExtensionPoint::Comid, Marker::default());
        let err = Triples::new().register_extensions(&exts).err().unwrap();
        assert_eq!(err.to_string(), "unexpected extension point: Comid");
    }
}
