// SPDX-License-Identifier: MIT

use corimkit::{
    comid::{Comid, Role},
    corim::{Meta, Signer, TagKind, UnsignedCorim, Validity},
    cose::SignedCorim,
    digest::HashAlgorithm,
    openssl::OpensslSigner,
    profiles::{PsaImplId, PsaRefValId, PSA_PROFILE},
    CborCodec, JsonCodec,
};

const PSA_COMID: &str = r#"{
    "tag-identity": {"id": "43bbe37f-2e61-4b33-aed3-53cff1428b16"},
    "entities": [{
        "name": "ACME Ltd.",
        "regid": "https://acme.example",
        "roles": ["tag-creator", "creator", "maintainer"]
    }],
    "triples": {
        "reference-values": [{
            "environment": {
                "class": {
                    "id": {"type": "psa.impl-id", "value": "YWNtZS1pbXBsZW1lbnRhdGlvbi1pZC0wMDAwMDAwMDE="},
                    "vendor": "ACME",
                    "model": "RoadRunner"
                }
            },
            "measurements": [{
                "key": {
                    "type": "psa.refval-id",
                    "value": {
                        "label": "BL",
                        "version": "2.1.0",
                        "signer-id": "rLsRx+TaIXIFUjzkzhokWuGiOa48a/2eeHH35di66Gs="
                    }
                },
                "value": {
                    "digests": ["sha-256;h0KPxSKAPTEGXnvOPPA/5HUJZjHl4Hu9eg/eYMTPJcc="]
                }
            }]
        }]
    }
}"#;

const PRIVATE_JWK: &str = r#"{
    "kty": "EC",
    "crv": "P-256",
    "d": "ZxfIqWVgn8uXSNQj0t8r_u6iS8WJuKxbmUzwNlpE760",
    "x": "_gPssLIiLnF0XrTGU73XMKlTIk4QhU80ttXzJ7waTpo",
    "y": "HgibD8RtoczLlJBzDi62cTacMR9NOL8mh6RfU2E3lwk"
}"#;

const PUBLIC_JWK: &str = r#"{
    "kty": "EC",
    "crv": "P-256",
    "x": "_gPssLIiLnF0XrTGU73XMKlTIk4QhU80ttXzJ7waTpo",
    "y": "HgibD8RtoczLlJBzDi62cTacMR9NOL8mh6RfU2E3lwk"
}"#;

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn test_psa_reference_value_round_trip() {
    let comid = Comid::from_json(PSA_COMID).unwrap();

    let entity = &comid.entities.as_ref().unwrap()[0];
    assert_eq!(
        entity.roles,
        vec![Role::TAG_CREATOR, Role::CREATOR, Role::MAINTAINER]
    );

    let triple = &comid.triples.reference_values.as_ref().unwrap()[0];
    let class_id = triple
        .environment
        .class
        .as_ref()
        .and_then(|c| c.class_id.as_ref())
        .unwrap();
    let impl_id = class_id.downcast_ref::<PsaImplId>().unwrap();
    assert_eq!(&impl_id.0 .0, b"acme-implementation-id-000000001");

    let measurement = &triple.measurements[0];
    let refval_id = measurement
        .mkey
        .as_ref()
        .and_then(|k| k.downcast_ref::<PsaRefValId>())
        .unwrap();
    assert_eq!(refval_id.0.label.as_deref(), Some("BL"));
    assert_eq!(refval_id.0.version.as_deref(), Some("2.1.0"));

    let digest = &measurement.mval.digests.as_ref().unwrap().0[0];
    assert_eq!(digest.algorithm(), Some(HashAlgorithm::Sha256));
    assert_eq!(&digest.value.0[..4], &[0x87, 0x42, 0x8f, 0xc5]);

    let cbor = comid.to_cbor().unwrap();
    // tag(600) bstr(32) "acme-implementation-id-000000001"
    let mut impl_id_item = vec![0xd9, 0x02, 0x58, 0x58, 0x20];
    impl_id_item.extend_from_slice(b"acme-implementation-id-000000001");
    assert!(contains(&cbor, &impl_id_item));
    // tag(601) map(3)
    assert!(contains(&cbor, &[0xd9, 0x02, 0x59, 0xa3]));

    let decoded = Comid::from_cbor(&cbor).unwrap();
    assert_eq!(decoded, comid);
    assert_eq!(decoded.to_cbor().unwrap(), cbor);

    let json = decoded.to_json().unwrap();
    assert_eq!(Comid::from_json(&json).unwrap(), comid);
}

fn psa_corim() -> UnsignedCorim {
    let comid = Comid::from_json(PSA_COMID).unwrap();

    let mut rim =
        UnsignedCorim::new("5c57e8f4-46cd-421b-91c9-08cf93e13cfc").with_profile(PSA_PROFILE);
    rim.add_comid(&comid).unwrap();
    rim.add_coswid(&[0xa0]);
    rim.add_cots(&[0xa1, 0x00, 0x01]);
    rim
}

fn meta() -> Meta {
    Meta::new(Signer::new("ACME Ltd.").with_uri("https://acme.example")).with_validity(
        Validity::new(
            chrono::DateTime::from_timestamp(1_700_000_000, 0),
            chrono::DateTime::from_timestamp(1_800_000_000, 0).unwrap(),
        ),
    )
}

#[test]
fn test_sign_then_verify_with_jwk() {
    let signer = OpensslSigner::from_jwk(PRIVATE_JWK).unwrap();
    let verifier = OpensslSigner::from_jwk(PUBLIC_JWK).unwrap();

    let rim = psa_corim();
    let signed = SignedCorim::new(rim.clone(), meta()).sign(&signer).unwrap();

    let verified = SignedCorim::verify_cose(&signed, &verifier).unwrap();
    assert_eq!(verified.unsigned, rim);
    assert_eq!(verified.meta, meta());

    let tags = verified.unsigned.extract_tags().unwrap();
    let kinds: Vec<TagKind> = tags.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, vec![TagKind::Comid, TagKind::Coswid, TagKind::Cots]);
    assert_eq!(
        Comid::from_cbor(tags[0].1).unwrap(),
        Comid::from_json(PSA_COMID).unwrap()
    );
    assert_eq!(tags[1].1, &[0xa0]);
    assert_eq!(tags[2].1, &[0xa1, 0x00, 0x01]);

    // flip a bit in the signature, which is the last item of the message
    let mut tampered = signed.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    let err = SignedCorim::verify_cose(&tampered, &verifier).err().unwrap();
    assert_eq!(err.to_string(), "signature verification failed");
}

#[test]
fn test_sign_rejects_invalid_corim() {
    let signer = OpensslSigner::from_jwk(PRIVATE_JWK).unwrap();

    let err = SignedCorim::new(UnsignedCorim::new("no-tags"), meta())
        .sign(&signer)
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        "failed validation of unsigned CoRIM: tags validation failed: no tags"
    );

    let verifier = OpensslSigner::from_jwk(PUBLIC_JWK).unwrap();
    let err = SignedCorim::new(psa_corim(), meta())
        .sign(&verifier)
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "key does not contain a private component");
}
