// SPDX-License-Identifier: MIT

//! Arm PSA and CCA profile identifiers.
//!
//! These are registered as built-in variants of the class id and measurement
//! key choices:
//!
//! | Type | Choice | Tag |
//! |---|---|---|
//! | [`PsaImplId`] `psa.impl-id` | class id | 600 |
//! | [`PsaRefValId`] `psa.refval-id` | measurement key | 601 |
//! | [`CcaPlatformConfigId`] `cca.platform-config-id` | measurement key | 602 |
//! | [`CcaRefValId`] `cca.refval-id` | measurement key | 603 |
//! | [`CcaImplId`] `cca.impl-id` | class id | 604 |

use std::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use derive_more::{Deref, DerefMut, From};
use serde::{
    de::{self, Visitor},
    ser::SerializeMap,
    Deserialize, Serialize,
};

use crate::{
    choice::{ChoiceInput, ChoiceValue},
    macros::map_len,
    Bytes, CoreError, FixedBytes, Result, Validate,
};

pub const PSA_IMPL_ID_TAG: u64 = 600;
pub const PSA_REFVAL_ID_TAG: u64 = 601;
pub const CCA_PLATFORM_CONFIG_ID_TAG: u64 = 602;
pub const CCA_REFVAL_ID_TAG: u64 = 603;
pub const CCA_IMPL_ID_TAG: u64 = 604;

/// CoRIM profile for PSA endorsements
pub const PSA_PROFILE: &str = "http://arm.com/psa/iot/1";
/// CoRIM profile for CCA platform endorsements
pub const CCA_PROFILE: &str = "http://arm.com/cca/ssd/1";

fn impl_id_bytes(input: &[u8]) -> Result<FixedBytes<32>> {
    FixedBytes::try_from(input).map_err(|_| {
        CoreError::ByteLength {
            want: "32",
            got: input.len(),
        }
        .into()
    })
}

fn impl_id_from_text(s: &str) -> Result<FixedBytes<32>> {
    let decoded = STANDARD
        .decode(s)
        .map_err(|e| CoreError::Base64(e.to_string()))?;
    impl_id_bytes(&decoded)
}

/// PSA implementation id: exactly 32 bytes identifying the silicon.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PsaImplId(pub FixedBytes<32>);

impl Validate for PsaImplId {
    fn valid(&self) -> Result<()> {
        Ok(())
    }
}

impl ChoiceValue for PsaImplId {
    fn type_name(&self) -> &'static str {
        "psa.impl-id"
    }
}

/// Accepts 32 raw bytes or their base64 encoding.
pub fn psa_impl_id_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let id = match input {
        ChoiceInput::None => PsaImplId::default(),
        ChoiceInput::Bytes(b) => PsaImplId(impl_id_bytes(&b)?),
        ChoiceInput::Text(s) => PsaImplId(impl_id_from_text(&s)?),
        other => other.into_value::<PsaImplId>("psa.impl-id")?,
    };
    Ok(Box::new(id))
}

/// CCA implementation id: exactly 32 bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CcaImplId(pub FixedBytes<32>);

impl Validate for CcaImplId {
    fn valid(&self) -> Result<()> {
        Ok(())
    }
}

impl ChoiceValue for CcaImplId {
    fn type_name(&self) -> &'static str {
        "cca.impl-id"
    }
}

pub fn cca_impl_id_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let id = match input {
        ChoiceInput::None => CcaImplId::default(),
        ChoiceInput::Bytes(b) => CcaImplId(impl_id_bytes(&b)?),
        ChoiceInput::Text(s) => CcaImplId(impl_id_from_text(&s)?),
        other => other.into_value::<CcaImplId>("cca.impl-id")?,
    };
    Ok(Box::new(id))
}

/// Identifies a software component by signer and, optionally, by label and
/// version.
///
/// ```text
/// { ? 1 => label, ? 4 => version, 5 => signer-id }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefValId {
    pub label: Option<String>,
    pub version: Option<String>,
    /// Hash of the signing authority, 32, 48 or 64 bytes.
    pub signer_id: Bytes,
}

impl RefValId {
    pub fn new(signer_id: impl Into<Vec<u8>>) -> Self {
        Self {
            label: None,
            version: None,
            signer_id: Bytes(signer_id.into()),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl Validate for RefValId {
    fn valid(&self) -> Result<()> {
        match self.signer_id.len() {
            32 | 48 | 64 => Ok(()),
            n => Err(CoreError::ByteLength {
                want: "32, 48 or 64",
                got: n,
            }
            .into()),
        }
    }
}

impl Serialize for RefValId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let is_human_readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(map_len!(self, 1, label, version)))?;

        if is_human_readable {
            if let Some(label) = &self.label {
                map.serialize_entry("label", label)?;
            }
            if let Some(version) = &self.version {
                map.serialize_entry("version", version)?;
            }
            map.serialize_entry("signer-id", &self.signer_id)?;
        } else {
            if let Some(label) = &self.label {
                map.serialize_entry(&1, label)?;
            }
            if let Some(version) = &self.version {
                map.serialize_entry(&4, version)?;
            }
            map.serialize_entry(&5, &self.signer_id)?;
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for RefValId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct RefValIdVisitor {
            is_human_readable: bool,
            marker: PhantomData<RefValId>,
        }

        impl<'de> Visitor<'de> for RefValIdVisitor {
            type Value = RefValId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map containing reference value id fields")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut id = RefValId::default();

                loop {
                    if self.is_human_readable {
                        match map.next_key::<String>()?.as_deref() {
                            Some("label") => id.label = Some(map.next_value()?),
                            Some("version") => id.version = Some(map.next_value()?),
                            Some("signer-id") => id.signer_id = map.next_value()?,
                            Some(s) => {
                                return Err(de::Error::unknown_field(
                                    s,
                                    &["label", "version", "signer-id"],
                                ))
                            }
                            None => break,
                        }
                    } else {
                        match map.next_key::<i64>()? {
                            Some(1) => id.label = Some(map.next_value()?),
                            Some(4) => id.version = Some(map.next_value()?),
                            Some(5) => id.signer_id = map.next_value()?,
                            Some(n) => {
                                return Err(de::Error::unknown_field(
                                    n.to_string().as_str(),
                                    &["1", "4", "5"],
                                ))
                            }
                            None => break,
                        }
                    }
                }

                Ok(id)
            }
        }

        let is_hr = deserializer.is_human_readable();
        deserializer.deserialize_map(RefValIdVisitor {
            is_human_readable: is_hr,
            marker: PhantomData,
        })
    }
}

/// PSA software component reference value id.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Deref, DerefMut, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PsaRefValId(pub RefValId);

impl Validate for PsaRefValId {
    fn valid(&self) -> Result<()> {
        self.0.valid()
    }
}

impl ChoiceValue for PsaRefValId {
    fn type_name(&self) -> &'static str {
        "psa.refval-id"
    }
}

pub fn psa_refval_id_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let id = match input {
        ChoiceInput::None => PsaRefValId::default(),
        ChoiceInput::Bytes(signer_id) => PsaRefValId(RefValId::new(signer_id)),
        other => other.into_value::<PsaRefValId>("psa.refval-id")?,
    };
    Ok(Box::new(id))
}

/// CCA software component reference value id.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Deref, DerefMut, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CcaRefValId(pub RefValId);

impl Validate for CcaRefValId {
    fn valid(&self) -> Result<()> {
        self.0.valid()
    }
}

impl ChoiceValue for CcaRefValId {
    fn type_name(&self) -> &'static str {
        "cca.refval-id"
    }
}

pub fn cca_refval_id_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let id = match input {
        ChoiceInput::None => CcaRefValId::default(),
        ChoiceInput::Bytes(signer_id) => CcaRefValId(RefValId::new(signer_id)),
        other => other.into_value::<CcaRefValId>("cca.refval-id")?,
    };
    Ok(Box::new(id))
}

/// Label of a CCA platform configuration measurement.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CcaPlatformConfigId(pub String);

impl Validate for CcaPlatformConfigId {
    fn valid(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(CoreError::Empty("CCA platform config id").into());
        }
        Ok(())
    }
}

impl ChoiceValue for CcaPlatformConfigId {
    fn type_name(&self) -> &'static str {
        "cca.platform-config-id"
    }
}

pub fn cca_platform_config_id_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let id = match input {
        ChoiceInput::None => CcaPlatformConfigId::default(),
        ChoiceInput::Text(s) => CcaPlatformConfigId(s),
        other => other.into_value::<CcaPlatformConfigId>("cca.platform-config-id")?,
    };
    Ok(Box::new(id))
}

#[cfg(test)]
#[rustfmt::skip::macros(vec)]
mod tests {
    use super::*;
    use crate::{choice::ChoiceValueBase, test::SerdeTestCase};

    #[test]
    fn test_refval_id_serde() {
        let id = RefValId::new(vec![0xaa; 32])
            .with_label("BL")
            .with_version("2.1.0");

        let mut expected_cbor: Vec<u8> = vec![
            0xa3, // map(3)
              0x01, // key: 1 [label]
              0x62, // value: tstr(2)
                0x42, 0x4c, // "BL"
              0x04, // key: 4 [version]
              0x65, // value: tstr(5)
                0x32, 0x2e, 0x31, 0x2e, 0x30, // "2.1.0"
              0x05, // key: 5 [signer-id]
              0x58, 0x20, // value: bstr(32)
        ];
        expected_cbor.extend_from_slice(&[0xaa; 32]);

        SerdeTestCase {
            value: id.clone(),
            expected_json: r#"{"label":"BL","version":"2.1.0","signer-id":"qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqo="}"#,
            expected_cbor,
        }
        .run();

        id.valid().unwrap();

        let short = RefValId::new(vec![0u8; 20]);
        assert_eq!(
            short.valid().err().unwrap().to_string(),
            "want 32, 48 or 64 bytes, got 20"
        );
    }

    #[test]
    fn test_impl_id_factory() {
        let id = psa_impl_id_factory(ChoiceInput::Text(
            "YWNtZS1pbXBsZW1lbnRhdGlvbi1pZC0wMDAwMDAwMDE=".to_string(),
        ))
        .unwrap();
        let id = id.as_any().downcast_ref::<PsaImplId>().unwrap();
        assert_eq!(&id.0 .0, b"acme-implementation-id-000000001");

        let err = psa_impl_id_factory(ChoiceInput::Bytes(vec![1, 2, 3]))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "want 32 bytes, got 3");
    }

    #[test]
    fn test_platform_config_id_valid() {
        assert_eq!(
            CcaPlatformConfigId::default()
                .valid()
                .err()
                .unwrap()
                .to_string(),
            "CCA platform config id must not be empty"
        );
        CcaPlatformConfigId("cfg v1.0.0".to_string()).valid().unwrap();
    }
}
