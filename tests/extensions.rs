// SPDX-License-Identifier: MIT

use std::{collections::BTreeMap, sync::Once};

use corimkit::{
    comid::Comid,
    extensions::{register_extension, registered_points, Extension, ExtensionPoint, Host},
    measurement::Mval,
    CborCodec, Error, JsonCodec, Result,
};
use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};

/// Firmware build identifier carried by reference values.
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
    fn validate(&self, host: Host<'_>) -> Result<()> {
        match (&self.build, host) {
            (Some(b), Host::Mval(mval)) if b.is_empty() && mval.name.is_some() => {
                Err(Error::custom("empty build"))
            }
            _ => Ok(()),
        }
    }
}

fn firmware() -> Box<dyn Extension> {
    Box::new(Firmware::default())
}

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| {
        register_extension(ExtensionPoint::ReferenceValue, firmware).unwrap();
    });
}

fn comid_json(build: &str) -> String {
    format!(
        concat!(
            r#"{{"tag-identity":{{"id":"fw-comid"}},"#,
            r#""triples":{{"reference-values":[{{"environment":{{"class":{{"vendor":"ACME"}}}},"#,
            r#""measurements":[{{"value":{{"name":"BL","build":"{}"}}}}]}}]}}}}"#,
        ),
        build
    )
}

fn firmware_of(comid: &Comid) -> Option<&Firmware> {
    let triples = comid.triples.reference_values.as_ref()?;
    triples[0].measurements[0].mval.extensions.get::<Firmware>()
}

#[test]
fn test_registered_extension_round_trip() {
    setup();

    let comid = Comid::from_json(&comid_json("r1.2")).unwrap();
    assert_eq!(
        firmware_of(&comid).unwrap().build.as_deref(),
        Some("r1.2")
    );

    let cbor = comid.to_cbor().unwrap();
    let decoded = Comid::from_cbor(&cbor).unwrap();
    assert_eq!(
        firmware_of(&decoded).unwrap().build.as_deref(),
        Some("r1.2")
    );
    assert_eq!(decoded, comid);

    // -70000 as a CBOR negative integer follows the name entry
    let key: [u8; 5] = [0x3a, 0x00, 0x01, 0x11, 0x6f];
    assert!(cbor.windows(key.len()).any(|w| w == key));

    let json = decoded.to_json().unwrap();
    assert!(json.contains(r#""value":{"name":"BL","build":"r1.2"}"#), "{json}");
}

#[test]
fn test_registered_extension_validation() {
    setup();

    let err = Comid::from_json(&comid_json("")).err().unwrap();
    assert!(err.to_string().ends_with("empty build"), "{err}");
}

#[test]
fn test_extension_registration_sealed() {
    setup();

    assert!(registered_points().contains(&ExtensionPoint::ReferenceValue));

    let err = register_extension(ExtensionPoint::ReferenceValue, firmware)
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        "extension point ReferenceValue is already registered"
    );

    Comid::from_json(&comid_json("r2")).unwrap();
    let err = register_extension(ExtensionPoint::EndorsedValue, firmware)
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        "registration closed: extension registry already in use"
    );
}

#[test]
fn test_unregistered_point_keeps_plain_mval() {
    setup();

    let mval: Mval = serde_json::from_str(r#"{"name":"BL","build":"r3"}"#).unwrap();
    assert!(mval.extensions.get::<Firmware>().is_none());
}
