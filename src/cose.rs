// SPDX-License-Identifier: MIT

//! Signed CoRIMs.
//!
//! ```text
//! COSE-Sign1-corim = #6.18([
//!   protected: bstr .cbor {
//!     1 => alg
//!     3 => "application/rim+cbor"
//!     8 => bstr .cbor corim-meta-map
//!   }
//!   unprotected: {}
//!   payload: bstr .cbor tagged-unsigned-corim-map
//!   signature: bstr
//! ])
//! ```
//!
//! Key handling is abstracted behind [`CoseSigner`] and [`CoseVerifier`];
//! [`crate::openssl::OpensslSigner`] implements both for EC2 keys.

use ciborium::Value as CborValue;
use coset::{
    iana, CborSerializable, CoseSign1, CoseSign1Builder, HeaderBuilder, Label,
    RegisteredLabel, RegisteredLabelWithPrivate, TaggedCborSerializable,
};

use crate::{
    codec::reject_indefinite,
    corim::{Meta, UnsignedCorim},
    CborCodec, CoseError, Error, Result, Validate,
};

pub const CONTENT_TYPE: &str = "application/rim+cbor";

/// Protected header label of the CoRIM meta.
pub const CORIM_META_LABEL: i64 = 8;

/// Produces raw `r || s` signatures over the COSE to-be-signed bytes.
pub trait CoseSigner {
    fn algorithm(&self) -> iana::Algorithm;
    fn sign(&self, alg: iana::Algorithm, data: &[u8]) -> Result<Vec<u8>>;
}

pub trait CoseVerifier {
    fn verify_signature(&self, alg: iana::Algorithm, sig: &[u8], data: &[u8]) -> Result<()>;
}

/// An unsigned CoRIM together with its signing metadata.
///
/// After [`SignedCorim::sign`] or [`SignedCorim::from_cose`] the COSE
/// message is retained so that [`SignedCorim::verify`] checks exactly the
/// bytes that were signed.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedCorim {
    pub unsigned: UnsignedCorim,
    pub meta: Meta,
    message: Option<CoseSign1>,
}

impl SignedCorim {
    pub fn new(unsigned: UnsignedCorim, meta: Meta) -> Self {
        Self {
            unsigned,
            meta,
            message: None,
        }
    }

    /// Validates both parts, signs them with `signer`, and returns the
    /// tagged COSE_Sign1 encoding.
    pub fn sign(&mut self, signer: &dyn CoseSigner) -> Result<Vec<u8>> {
        self.unsigned
            .valid()
            .map_err(|e| e.context("failed validation of unsigned CoRIM"))?;
        self.meta
            .valid()
            .map_err(|e| e.context("failed validation of CoRIM meta"))?;

        let alg = signer.algorithm();
        let payload = self.unsigned.to_tagged_cbor()?;
        let meta = self.meta.to_cbor()?;

        let protected = HeaderBuilder::new()
            .algorithm(alg)
            .content_type(CONTENT_TYPE.to_string())
            .value(CORIM_META_LABEL, CborValue::Bytes(meta))
            .build();

        let message = CoseSign1Builder::new()
            .protected(protected)
            .payload(payload)
            .try_create_signature(&[], |tbs| signer.sign(alg, tbs))?
            .build();

        let data = message.clone().to_tagged_vec()?;
        self.message = Some(message);
        Ok(data)
    }

    /// Decodes a COSE_Sign1 CoRIM, tagged or not, and validates its content.
    /// The signature is not checked; see [`SignedCorim::verify`].
    pub fn from_cose(data: &[u8]) -> Result<Self> {
        reject_indefinite(data)?;
        let message = match data.first() {
            Some(0xd2) => CoseSign1::from_tagged_slice(data)?,
            _ => CoseSign1::from_slice(data)?,
        };

        let header = &message.protected.header;
        if header.alg.is_none() {
            return Err(CoseError::MissingAlgorithm.into());
        }

        match &header.content_type {
            Some(RegisteredLabel::Text(ct))
                if ct == CONTENT_TYPE || ct.starts_with(&format!("{CONTENT_TYPE};")) => {}
            Some(other) => return Err(CoseError::ContentType(format!("{other:?}")).into()),
            None => return Err(CoseError::MissingContentType.into()),
        }

        let meta = header
            .rest
            .iter()
            .find_map(|(label, value)| match (label, value) {
                (Label::Int(CORIM_META_LABEL), CborValue::Bytes(b)) => Some(b),
                _ => None,
            })
            .ok_or(CoseError::MissingMeta)?;
        let meta = Meta::from_cbor(meta).map_err(|e| e.context("failed validation of CoRIM meta"))?;

        let payload = message.payload.as_deref().ok_or(CoseError::MissingPayload)?;
        let unsigned = UnsignedCorim::decode_tagged(payload)?;
        unsigned
            .valid()
            .map_err(|e| e.context("failed validation of unsigned CoRIM"))?;

        Ok(Self {
            unsigned,
            meta,
            message: Some(message),
        })
    }

    pub fn algorithm(&self) -> Option<iana::Algorithm> {
        match self.message.as_ref()?.protected.header.alg.as_ref()? {
            RegisteredLabelWithPrivate::Assigned(alg) => Some(*alg),
            _ => None,
        }
    }

    /// Checks the signature of the decoded or freshly signed message.
    pub fn verify(&self, verifier: &dyn CoseVerifier) -> Result<()> {
        let message = self
            .message
            .as_ref()
            .ok_or_else(|| Error::custom("CoRIM has not been signed or decoded"))?;
        let alg = match &message.protected.header.alg {
            Some(RegisteredLabelWithPrivate::Assigned(alg)) => *alg,
            Some(other) => {
                return Err(CoseError::UnsupportedAlgorithm(format!("{other:?}")).into())
            }
            None => return Err(CoseError::MissingAlgorithm.into()),
        };

        message.verify_signature(&[], |sig, data| verifier.verify_signature(alg, sig, data))
    }

    /// Decodes `data` and checks its signature.
    pub fn verify_cose(data: &[u8], verifier: &dyn CoseVerifier) -> Result<Self> {
        let signed = Self::from_cose(data)?;
        signed.verify(verifier)?;
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corim::{Signer, Validity},
        openssl::{test_keys::*, OpensslSigner},
        profiles::PSA_PROFILE,
    };
    use chrono::DateTime;

    fn meta() -> Meta {
        Meta::new(Signer::new("ACME Ltd.").with_uri("https://acme.example")).with_validity(
            Validity::new(
                DateTime::from_timestamp(1_700_000_000, 0),
                DateTime::from_timestamp(1_800_000_000, 0).unwrap(),
            ),
        )
    }

    fn unsigned() -> UnsignedCorim {
        let mut rim = UnsignedCorim::new("5c57e8f4-46cd-421b-91c9-08cf93e13cfc");
        rim.add_coswid(&[0x44, 0xde, 0xad, 0xbe, 0xef]);
        rim
    }

    #[test]
    fn test_sign_then_verify() {
        let signer = OpensslSigner::from_jwk(PRIVATE_JWK).unwrap();
        let verifier = OpensslSigner::from_jwk(PUBLIC_JWK).unwrap();

        let mut signed = SignedCorim::new(unsigned(), meta());
        let data = signed.sign(&signer).unwrap();
        assert_eq!(data[0], 0xd2); // tag(18)
        signed.verify(&verifier).unwrap();

        let decoded = SignedCorim::verify_cose(&data, &verifier).unwrap();
        assert_eq!(decoded.unsigned, unsigned());
        assert_eq!(decoded.meta, meta());
        assert_eq!(decoded.algorithm(), Some(iana::Algorithm::ES256));

        // flip a bit in the signature
        let mut tampered = data.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        let err = SignedCorim::verify_cose(&tampered, &verifier).err().unwrap();
        assert_eq!(err.to_string(), "signature verification failed");
    }

    #[test]
    fn test_sign_rejects_invalid_input() {
        let signer = OpensslSigner::from_jwk(PRIVATE_JWK).unwrap();

        let mut signed = SignedCorim::new(UnsignedCorim::new("rim"), meta());
        let err = signed.sign(&signer).err().unwrap();
        assert_eq!(
            err.to_string(),
            "failed validation of unsigned CoRIM: tags validation failed: no tags"
        );

        let mut signed = SignedCorim::new(unsigned(), Meta::default());
        let err = signed.sign(&signer).err().unwrap();
        assert_eq!(
            err.to_string(),
            "failed validation of CoRIM meta: signer validation failed: empty signer name"
        );

        let public = OpensslSigner::from_jwk(PUBLIC_JWK).unwrap();
        let err = SignedCorim::new(unsigned(), meta()).sign(&public).err().unwrap();
        assert_eq!(err.to_string(), "key does not contain a private component");
    }

    fn sign_raw(protected: coset::Header, payload: Vec<u8>) -> Vec<u8> {
        let signer = OpensslSigner::from_jwk(PRIVATE_JWK).unwrap();
        CoseSign1Builder::new()
            .protected(protected)
            .payload(payload)
            .try_create_signature(&[], |tbs| signer.sign(iana::Algorithm::ES256, tbs))
            .unwrap()
            .build()
            .to_tagged_vec()
            .unwrap()
    }

    #[test]
    fn test_decode_invalid_inner_corim() {
        let protected = HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .content_type(CONTENT_TYPE.to_string())
            .value(CORIM_META_LABEL, CborValue::Bytes(meta().to_cbor().unwrap()))
            .build();

        // tagged unsigned CoRIM with tags but no id
        let payload = vec![
            0xd9, 0x01, 0xf5, 0xa1, 0x01, 0x81, 0xd9, 0x01, 0xf9, 0x44, 0xde, 0xad, 0xbe, 0xef,
        ];
        let data = sign_raw(protected, payload);

        let err = SignedCorim::from_cose(&data).err().unwrap();
        assert_eq!(err.to_string(), "failed validation of unsigned CoRIM: empty id");
    }

    #[test]
    fn test_decode_header_errors() {
        let payload = unsigned().to_tagged_cbor().unwrap();

        let protected = HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .content_type(CONTENT_TYPE.to_string())
            .build();
        let err = SignedCorim::from_cose(&sign_raw(protected, payload.clone()))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "missing CoRIM meta in protected header");

        let protected = HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .value(CORIM_META_LABEL, CborValue::Bytes(meta().to_cbor().unwrap()))
            .build();
        let err = SignedCorim::from_cose(&sign_raw(protected, payload.clone()))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "missing content type in protected header");

        let protected = HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .content_type(CONTENT_TYPE.to_string())
            .value(CORIM_META_LABEL, CborValue::Bytes(meta().to_cbor().unwrap()))
            .build();
        let err = SignedCorim::from_cose(&sign_raw(protected, payload[3..].to_vec()))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "did not see unsigned CoRIM tag");
    }

    #[test]
    fn test_sign_then_verify_with_uri_profile() {
        let signer = OpensslSigner::private_key_from_pem(PRIVATE_PEM.as_bytes()).unwrap();
        let verifier = OpensslSigner::public_key_from_pem(PUBLIC_PEM.as_bytes()).unwrap();

        let rim = unsigned().with_profile(PSA_PROFILE);
        let data = SignedCorim::new(rim.clone(), meta()).sign(&signer).unwrap();

        let decoded = SignedCorim::verify_cose(&data, &verifier).unwrap();
        assert_eq!(decoded.unsigned, rim);
        assert_eq!(
            decoded.message.unwrap().protected.header.content_type,
            Some(RegisteredLabel::Text(CONTENT_TYPE.to_string()))
        );
    }

    #[test]
    fn test_decode_keeps_tagged_error() {
        // a profile URI as a content-type parameter breaks the type/subtype form
        let protected = HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .content_type(format!("{CONTENT_TYPE}; profile=\"{PSA_PROFILE}\""))
            .value(CORIM_META_LABEL, CborValue::Bytes(meta().to_cbor().unwrap()))
            .build();
        let data = sign_raw(protected, unsigned().to_tagged_cbor().unwrap());

        let err = SignedCorim::from_cose(&data).err().unwrap().to_string();
        assert!(err.contains("expected text of form type/subtype"), "{err}");
    }
}
