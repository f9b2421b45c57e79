// SPDX-License-Identifier: MIT

use std::sync::Once;

use corimkit::{
    choice::{ChoiceInput, ChoiceValue},
    corim::Tag,
    environment::{ClassId, Group},
    measurement::Mkey,
    CborCodec, Error, JsonCodec, Result, Uuid, Validate,
};
use serde::{Deserialize, Serialize};

const ACME_ID_TAG: u64 = 60000;

/// Vendor specific class identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct AcmeId(String);

impl Validate for AcmeId {
    fn valid(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::custom("empty ACME id"));
        }
        Ok(())
    }
}

impl ChoiceValue for AcmeId {
    fn type_name(&self) -> &'static str {
        "acme.id"
    }
}

fn acme_id_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let id = match input {
        ChoiceInput::None => AcmeId::default(),
        ChoiceInput::Text(s) => AcmeId(s),
        other => other.into_value::<AcmeId>("acme.id")?,
    };
    Ok(Box::new(id))
}

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| {
        ClassId::register::<AcmeId>(ACME_ID_TAG, acme_id_factory).unwrap();
    });
}

#[test]
fn test_registered_variant_round_trip() {
    setup();

    assert!(ClassId::registered_types().contains(&"acme.id"));

    let id = ClassId::new("widget-7", "acme.id").unwrap();
    assert_eq!(id.type_name(), Some("acme.id"));

    let cbor = id.to_cbor().unwrap();
    assert_eq!(
        cbor,
        vec![
            0xd9, 0xea, 0x60, // tag(60000)
            0x68, // tstr(8)
            0x77, 0x69, 0x64, 0x67, 0x65, 0x74, 0x2d, 0x37, // "widget-7"
        ]
    );
    assert_eq!(ClassId::from_cbor(&cbor).unwrap(), id);

    let json = id.to_json().unwrap();
    assert_eq!(json, r#"{"type":"acme.id","value":"widget-7"}"#);
    assert_eq!(ClassId::from_json(&json).unwrap(), id);

    let from_value =
        ClassId::new(ChoiceInput::value(AcmeId("widget-7".into())), "acme.id").unwrap();
    assert_eq!(from_value, id);

    let err = ClassId::from_json(r#"{"type":"acme.id","value":""}"#)
        .err()
        .unwrap();
    assert!(
        err.to_string().starts_with("invalid acme.id: empty ACME id"),
        "{err}"
    );
}

#[test]
fn test_registered_variant_is_per_choice() {
    setup();

    let err = Group::new("widget-7", "acme.id").err().unwrap();
    assert_eq!(err.to_string(), "unknown group type: acme.id");
}

#[test]
fn test_duplicate_registrations() {
    setup();

    let err = ClassId::register::<AcmeId>(ACME_ID_TAG, acme_id_factory)
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "tag 60000 is already registered");

    let err = ClassId::register::<AcmeId>(ACME_ID_TAG + 1, acme_id_factory)
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        r#"class id type with name "acme.id" already exists"#
    );

    let err = ClassId::register::<Uuid>(37, |_| Ok(Box::new(Uuid::default())))
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "tag 37 is already registered");
}

#[test]
fn test_registration_closed_after_use() {
    setup();

    Mkey::new(7u64, "uint").unwrap().to_cbor().unwrap();

    let err = Mkey::register::<AcmeId>(ACME_ID_TAG, acme_id_factory)
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        "registration closed: measurement key registry already in use"
    );
}

#[test]
fn test_unknown_tag_decode() {
    setup();

    // tag(60001) h''
    let err = ClassId::from_cbor(&[0xd9, 0xea, 0x61, 0x40]).err().unwrap();
    assert_eq!(err.to_string(), "unknown class id (CBOR: d9ea6140)");

    let err = ClassId::from_json(r#"{"type":"acme.serial","value":"x"}"#)
        .err()
        .unwrap();
    assert!(
        err.to_string().starts_with("unknown class id type: acme.serial"),
        "{err}"
    );

    // tag(507) {} as a CoRIM tag
    let tag = Tag::from_bytes(vec![0xd9, 0x01, 0xfb, 0xa0]);
    assert_eq!(
        tag.kind().err().unwrap().to_string(),
        "unrecognized tag prefix d901fb"
    );
}
