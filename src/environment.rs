// SPDX-License-Identifier: MIT

//! Environments: the "subject" of every triple.
//!
//! ```text
//! environment-map = { ? 0 => class-map, ? 1 => $instance-id-type-choice, ? 2 => $group-id-type-choice }
//! class-map = { ? 0 => $class-id-type-choice, ? 1 => tstr, ? 2 => tstr, ? 3 => uint, ? 4 => uint }
//! ```

use std::marker::PhantomData;

use serde::{
    de::{self, Visitor},
    ser::SerializeMap,
    Deserialize, Serialize,
};

use crate::{
    choice::{
        bytes_factory, int_factory, oid_factory, ueid_factory, uuid_factory, Registry,
        TypeChoice, BYTES_TAG, OID_TAG, UEID_TAG, UUID_TAG,
    },
    macros::{choice_kind, map_len},
    profiles::{
        cca_impl_id_factory, psa_impl_id_factory, CcaImplId, PsaImplId, CCA_IMPL_ID_TAG,
        PSA_IMPL_ID_TAG,
    },
    Error, Int, Oid, Result, TaggedBytes, TriplesError, Ueid, Uuid, Validate,
};

choice_kind!(
    /// Marker for class identifiers.
    ClassIdKind,
    "class id",
    Registry::new()
        .with::<Oid>(Some(OID_TAG), oid_factory)
        .with::<Uuid>(Some(UUID_TAG), uuid_factory)
        .with::<Int>(None, int_factory)
        .with::<TaggedBytes>(Some(BYTES_TAG), bytes_factory)
        .with::<PsaImplId>(Some(PSA_IMPL_ID_TAG), psa_impl_id_factory)
        .with::<CcaImplId>(Some(CCA_IMPL_ID_TAG), cca_impl_id_factory)
);

/// Identifies the class of an environment (a model, a product line, ...).
pub type ClassId = TypeChoice<ClassIdKind>;

choice_kind!(
    /// Marker for instance identifiers.
    InstanceKind,
    "instance",
    Registry::new()
        .with::<Ueid>(Some(UEID_TAG), ueid_factory)
        .with::<Uuid>(Some(UUID_TAG), uuid_factory)
        .with::<TaggedBytes>(Some(BYTES_TAG), bytes_factory)
);

/// Identifies a specific instance of an environment, e.g. one device.
pub type Instance = TypeChoice<InstanceKind>;

choice_kind!(
    /// Marker for group identifiers.
    GroupKind,
    "group",
    Registry::new()
        .with::<Uuid>(Some(UUID_TAG), uuid_factory)
        .with::<TaggedBytes>(Some(BYTES_TAG), bytes_factory)
);

/// Identifies a group of instances.
pub type Group = TypeChoice<GroupKind>;

/// Describes the class of an environment. At least one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Class {
    pub class_id: Option<ClassId>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub layer: Option<u64>,
    pub index: Option<u64>,
}

impl Class {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class_id(mut self, class_id: ClassId) -> Self {
        self.class_id = Some(class_id);
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_layer(mut self, layer: u64) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    fn is_empty(&self) -> bool {
        self.class_id.is_none()
            && self.vendor.is_none()
            && self.model.is_none()
            && self.layer.is_none()
            && self.index.is_none()
    }
}

impl Validate for Class {
    fn valid(&self) -> Result<()> {
        if self.is_empty() {
            return Err(TriplesError::EmptyClass.into());
        }

        if let Some(class_id) = &self.class_id {
            class_id
                .valid()
                .map_err(|e| Error::validation("class-id", e))?;
        }

        Ok(())
    }
}

impl Serialize for Class {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(map_len!(
            self, 0, class_id, vendor, model, layer, index
        )))?;

        if is_human_readable {
            if let Some(class_id) = &self.class_id {
                map.serialize_entry("id", class_id)?;
            }
            if let Some(vendor) = &self.vendor {
                map.serialize_entry("vendor", vendor)?;
            }
            if let Some(model) = &self.model {
                map.serialize_entry("model", model)?;
            }
            if let Some(layer) = &self.layer {
                map.serialize_entry("layer", layer)?;
            }
            if let Some(index) = &self.index {
                map.serialize_entry("index", index)?;
            }
        } else {
            if let Some(class_id) = &self.class_id {
                map.serialize_entry(&0, class_id)?;
            }
            if let Some(vendor) = &self.vendor {
                map.serialize_entry(&1, vendor)?;
            }
            if let Some(model) = &self.model {
                map.serialize_entry(&2, model)?;
            }
            if let Some(layer) = &self.layer {
                map.serialize_entry(&3, layer)?;
            }
            if let Some(index) = &self.index {
                map.serialize_entry(&4, index)?;
            }
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for Class {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct ClassVisitor {
            is_human_readable: bool,
            marker: PhantomData<Class>,
        }

        impl<'de> Visitor<'de> for ClassVisitor {
            type Value = Class;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing class fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut class = Class::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("id") => class.class_id = Some(map.next_value()?),
                            Some("vendor") => class.vendor = Some(map.next_value()?),
                            Some("model") => class.model = Some(map.next_value()?),
                            Some("layer") => class.layer = Some(map.next_value()?),
                            Some("index") => class.index = Some(map.next_value()?),
                            Some(s) => {
                                return Err(de::Error::unknown_field(
                                    s,
                                    &["id", "vendor", "model", "layer", "index"],
                                ))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => class.class_id = Some(map.next_value()?),
                            Some(1) => class.vendor = Some(map.next_value()?),
                            Some(2) => class.model = Some(map.next_value()?),
                            Some(3) => class.layer = Some(map.next_value()?),
                            Some(4) => class.index = Some(map.next_value()?),
                            Some(n) => {
                                return Err(de::Error::unknown_field(
                                    n.to_string().as_str(),
                                    &["0", "1", "2", "3", "4"],
                                ))
                            }
                            None => break,
                        }
                    }
                }

                Ok(class)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(ClassVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// The target environment of a triple. At least one of `class`, `instance`
/// or `group` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub class: Option<Class>,
    pub instance: Option<Instance>,
    pub group: Option<Group>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: Class) -> Self {
        self.class = Some(class);
        self
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.group = Some(group);
        self
    }
}

impl Validate for Environment {
    fn valid(&self) -> Result<()> {
        if self.class.is_none() && self.instance.is_none() && self.group.is_none() {
            return Err(TriplesError::EmptyEnvironment.into());
        }

        if let Some(class) = &self.class {
            class.valid().map_err(|e| Error::validation("class", e))?;
        }

        if let Some(instance) = &self.instance {
            instance
                .valid()
                .map_err(|e| Error::validation("instance", e))?;
        }

        if let Some(group) = &self.group {
            group.valid().map_err(|e| Error::validation("group", e))?;
        }

        Ok(())
    }
}

impl Serialize for Environment {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let is_human_readable = serializer.is_human_readable();
        let mut map =
            serializer.serialize_map(Some(map_len!(self, 0, class, instance, group)))?;

        if is_human_readable {
            if let Some(class) = &self.class {
                map.serialize_entry("class", class)?;
            }
            if let Some(instance) = &self.instance {
                map.serialize_entry("instance", instance)?;
            }
            if let Some(group) = &self.group {
                map.serialize_entry("group", group)?;
            }
        } else {
            if let Some(class) = &self.class {
                map.serialize_entry(&0, class)?;
            }
            if let Some(instance) = &self.instance {
                map.serialize_entry(&1, instance)?;
            }
            if let Some(group) = &self.group {
                map.serialize_entry(&2, group)?;
            }
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct EnvironmentVisitor {
            is_human_readable: bool,
            marker: PhantomData<Environment>,
        }

        impl<'de> Visitor<'de> for EnvironmentVisitor {
            type Value = Environment;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing environment fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut env = Environment::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("class") => env.class = Some(map.next_value()?),
                            Some("instance") => env.instance = Some(map.next_value()?),
                            Some("group") => env.group = Some(map.next_value()?),
                            Some(s) => {
                                return Err(de::Error::unknown_field(
                                    s,
                                    &["class", "instance", "group"],
                                ))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(0) => env.class = Some(map.next_value()?),
                            Some(1) => env.instance = Some(map.next_value()?),
                            Some(2) => env.group = Some(map.next_value()?),
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

                Ok(env)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(EnvironmentVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

#[cfg(test)]
#[rustfmt::skip::macros(vec)]
mod tests {
    use super::*;
    use crate::test::SerdeTestCase;

    #[test]
    fn test_environment_serde() {
        let env = Environment::new()
            .with_class(
                Class::new()
                    .with_class_id(
                        ClassId::new("31fb5abf-023e-4992-aa4e-95f9c1503bfa", "uuid").unwrap(),
                    )
                    .with_vendor("ACME")
                    .with_layer(1),
            )
            .with_group(Group::new(vec![0x01, 0x02], "bytes").unwrap());

        SerdeTestCase {
            value: env,
            expected_json: concat!(
                r#"{"class":{"id":{"type":"uuid","value":"31fb5abf-023e-4992-aa4e-95f9c1503bfa"},"#,
                r#""vendor":"ACME","layer":1},"group":{"type":"bytes","value":"AQI="}}"#,
            ),
            expected_cbor: vec![
                0xa2, // map(2)
                  0x00, // key: 0 [class]
                  0xa3, // value: map(3)
                    0x00, // key: 0 [class-id]
                    0xd8, 0x25, // tag(37)
                      0x50, // bstr(16)
                        0x31, 0xfb, 0x5a, 0xbf, 0x02, 0x3e, 0x49, 0x92,
                        0xaa, 0x4e, 0x95, 0xf9, 0xc1, 0x50, 0x3b, 0xfa,
                    0x01, // key: 1 [vendor]
                    0x64, // tstr(4)
                      0x41, 0x43, 0x4d, 0x45, // "ACME"
                    0x03, // key: 3 [layer]
                    0x01, // 1
                  0x02, // key: 2 [group]
                  0xd9, 0x02, 0x30, // tag(560)
                    0x42, // bstr(2)
                      0x01, 0x02,
            ],
        }
        .run();
    }

    #[test]
    fn test_class_id_variants() {
        assert_eq!(
            ClassId::registered_types(),
            vec!["bytes", "cca.impl-id", "int", "oid", "psa.impl-id", "uuid"]
        );

        let int = ClassId::new(7i64, "int").unwrap();
        let mut buf: Vec<u8> = vec![];
        ciborium::into_writer(&int, &mut buf).unwrap();
        assert_eq!(buf, vec![0x07]);

        let psa = ClassId::new(vec![0x61; 32], "psa.impl-id").unwrap();
        let mut buf: Vec<u8> = vec![];
        ciborium::into_writer(&psa, &mut buf).unwrap();
        assert_eq!(&buf[..5], &[0xd9, 0x02, 0x58, 0x58, 0x20]);
    }

    #[test]
    fn test_environment_valid() {
        assert_eq!(
            Environment::new().valid().err().unwrap().to_string(),
            "environment must not be empty"
        );

        let env = Environment::new().with_class(Class::new());
        assert_eq!(
            env.valid().err().unwrap().to_string(),
            "class validation failed: class must not be empty"
        );

        let env = Environment::new().with_instance(Instance::from_value(Ueid::from(vec![0x01])));
        assert_eq!(
            env.valid().err().unwrap().to_string(),
            "instance validation failed: invalid ueid: invalid RAND UEID length: got 1 bytes"
        );
    }

    #[test]
    fn test_unknown_instance_tag() {
        let data: Vec<u8> = vec![
            0xa1, // map(1)
              0x01, // key: 1 [instance]
              0xd9, 0x03, 0xe7, // tag(999)
                0x41, 0x00,
        ];

        let err = ciborium::from_reader::<Environment, _>(data.as_slice())
            .err()
            .unwrap()
            .to_string();
        assert_eq!(err, "Semantic(None, \"unknown instance (CBOR: d903e74100)\")");
    }
}
