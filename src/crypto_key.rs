// SPDX-License-Identifier: MIT

//! Cryptographic key material carried by key triples and measurements.
//!
//! | Type name | Tag | Payload |
//! |---|---|---|
//! | `pkix-base64-key` | 554 | PEM SubjectPublicKeyInfo |
//! | `pkix-base64-cert` | 555 | PEM X.509 certificate |
//! | `pkix-base64-cert-path` | 556 | PEM certificate chain |
//! | `thumbprint` | 557 | digest of a key |
//! | `cose-key` | 558 | COSE_Key |
//! | `cert-thumbprint` | 559 | digest of a certificate |
//! | `cert-path-thumbprint` | 561 | digest of a certificate chain |

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ciborium::Value as CborValue;
use coset::CborSerializable;
use derive_more::{Deref, From};
use openssl::{pkey::PKey, x509::X509};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    choice::{ChoiceInput, ChoiceValue, Registry, TypeChoice},
    codec::cbor_value_to_bytes,
    macros::choice_kind,
    CoreError, HashEntry, Result, Validate,
};

pub const PKIX_BASE64_KEY_TAG: u64 = 554;
pub const PKIX_BASE64_CERT_TAG: u64 = 555;
pub const PKIX_BASE64_CERT_PATH_TAG: u64 = 556;
pub const THUMBPRINT_TAG: u64 = 557;
pub const COSE_KEY_TAG: u64 = 558;
pub const CERT_THUMBPRINT_TAG: u64 = 559;
pub const CERT_PATH_THUMBPRINT_TAG: u64 = 561;

choice_kind!(
    /// Marker for cryptographic keys.
    CryptoKeyKind,
    "crypto key",
    Registry::new()
        .with::<PkixBase64Key>(Some(PKIX_BASE64_KEY_TAG), pkix_base64_key_factory)
        .with::<PkixBase64Cert>(Some(PKIX_BASE64_CERT_TAG), pkix_base64_cert_factory)
        .with::<PkixBase64CertPath>(Some(PKIX_BASE64_CERT_PATH_TAG), pkix_base64_cert_path_factory)
        .with::<Thumbprint>(Some(THUMBPRINT_TAG), thumbprint_factory)
        .with::<CoseKey>(Some(COSE_KEY_TAG), cose_key_factory)
        .with::<CertThumbprint>(Some(CERT_THUMBPRINT_TAG), cert_thumbprint_factory)
        .with::<CertPathThumbprint>(Some(CERT_PATH_THUMBPRINT_TAG), cert_path_thumbprint_factory)
);

/// A verification key or certificate in one of the registered encodings.
pub type CryptoKey = TypeChoice<CryptoKeyKind>;

fn pem_error(what: &'static str, err: openssl::error::ErrorStack) -> crate::Error {
    CoreError::Invalid {
        what,
        reason: err.to_string(),
    }
    .into()
}

/// PEM-encoded SubjectPublicKeyInfo.
#[derive(Debug, Clone, Default, PartialEq, Eq, From, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkixBase64Key(pub String);

impl Validate for PkixBase64Key {
    fn valid(&self) -> Result<()> {
        PKey::public_key_from_pem(self.0.as_bytes()).map_err(|e| pem_error("PEM public key", e))?;
        Ok(())
    }
}

impl ChoiceValue for PkixBase64Key {
    fn type_name(&self) -> &'static str {
        "pkix-base64-key"
    }
}

/// PEM-encoded X.509 certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, From, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkixBase64Cert(pub String);

impl Validate for PkixBase64Cert {
    fn valid(&self) -> Result<()> {
        X509::from_pem(self.0.as_bytes()).map_err(|e| pem_error("PEM certificate", e))?;
        Ok(())
    }
}

impl ChoiceValue for PkixBase64Cert {
    fn type_name(&self) -> &'static str {
        "pkix-base64-cert"
    }
}

/// Concatenated PEM certificates, leaf first.
#[derive(Debug, Clone, Default, PartialEq, Eq, From, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkixBase64CertPath(pub String);

impl Validate for PkixBase64CertPath {
    fn valid(&self) -> Result<()> {
        let certs = X509::stack_from_pem(self.0.as_bytes())
            .map_err(|e| pem_error("PEM certificate path", e))?;

        if certs.is_empty() {
            return Err(CoreError::Empty("certificate path").into());
        }
        Ok(())
    }
}

impl ChoiceValue for PkixBase64CertPath {
    fn type_name(&self) -> &'static str {
        "pkix-base64-cert-path"
    }
}

macro_rules! thumbprint_type {
    ($(#[$meta:meta])* $name:ident, $type_name:literal, $factory:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, From, Deref, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub HashEntry);

        impl Validate for $name {
            fn valid(&self) -> Result<()> {
                self.0.valid()
            }
        }

        impl ChoiceValue for $name {
            fn type_name(&self) -> &'static str {
                $type_name
            }
        }

        /// Accepts a `"<alg-name>;<base64>"` string or a [`HashEntry`].
        pub fn $factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
            let value = match input {
                ChoiceInput::None => $name::default(),
                ChoiceInput::Text(s) => $name(s.parse::<HashEntry>()?),
                ChoiceInput::Value(v) => match v.downcast::<HashEntry>() {
                    Ok(entry) => $name(*entry),
                    Err(v) => ChoiceInput::Value(v).into_value::<$name>($type_name)?,
                },
                other => other.into_value::<$name>($type_name)?,
            };
            Ok(Box::new(value))
        }
    };
}

thumbprint_type!(
    /// Digest of a public key.
    Thumbprint,
    "thumbprint",
    thumbprint_factory
);

thumbprint_type!(
    /// Digest of a DER certificate.
    CertThumbprint,
    "cert-thumbprint",
    cert_thumbprint_factory
);

thumbprint_type!(
    /// Digest of a DER certificate chain.
    CertPathThumbprint,
    "cert-path-thumbprint",
    cert_path_thumbprint_factory
);

/// A COSE_Key, kept as the decoded CBOR item so that it re-encodes exactly.
///
/// In JSON the key is carried as base64 of its CBOR encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct CoseKey(pub CborValue);

impl Default for CoseKey {
    fn default() -> Self {
        Self(CborValue::Map(vec![]))
    }
}

impl CoseKey {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self(ciborium::from_reader(data)?))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        cbor_value_to_bytes(&self.0)
    }

    /// Parses the key with `coset`.
    pub fn to_cose_key(&self) -> Result<coset::CoseKey> {
        Ok(coset::CoseKey::from_slice(&self.to_bytes()?)?)
    }
}

impl From<coset::CoseKey> for CoseKey {
    fn from(key: coset::CoseKey) -> Self {
        use coset::AsCborValue;

        Self(key.to_cbor_value().unwrap_or(CborValue::Null))
    }
}

impl Validate for CoseKey {
    fn valid(&self) -> Result<()> {
        let key = self.to_cose_key().map_err(|e| CoreError::Invalid {
            what: "COSE key",
            reason: e.to_string(),
        })?;

        if key.kty == coset::KeyType::Assigned(coset::iana::KeyType::Reserved) {
            return Err(CoreError::Invalid {
                what: "COSE key",
                reason: "reserved key type".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl ChoiceValue for CoseKey {
    fn type_name(&self) -> &'static str {
        "cose-key"
    }
}

impl Serialize for CoseKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let bytes = self.to_bytes().map_err(serde::ser::Error::custom)?;
            serializer.serialize_str(&STANDARD.encode(bytes))
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for CoseKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let b64 = String::deserialize(deserializer)?;
            let bytes = STANDARD.decode(b64).map_err(de::Error::custom)?;
            Self::from_bytes(&bytes).map_err(de::Error::custom)
        } else {
            Ok(Self(CborValue::deserialize(deserializer)?))
        }
    }
}

/// Accepts the CBOR encoding of a COSE_Key, or a [`coset::CoseKey`].
pub fn cose_key_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let key = match input {
        ChoiceInput::None => CoseKey::default(),
        ChoiceInput::Bytes(b) => CoseKey::from_bytes(&b)?,
        ChoiceInput::Text(s) => CoseKey::from_bytes(
            &STANDARD
                .decode(s)
                .map_err(|e| CoreError::Base64(e.to_string()))?,
        )?,
        ChoiceInput::Value(v) => match v.downcast::<coset::CoseKey>() {
            Ok(key) => CoseKey::from(*key),
            Err(v) => ChoiceInput::Value(v).into_value::<CoseKey>("cose-key")?,
        },
        other => other.into_value::<CoseKey>("cose-key")?,
    };
    Ok(Box::new(key))
}

pub fn pkix_base64_key_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let key = match input {
        ChoiceInput::None => PkixBase64Key::default(),
        ChoiceInput::Text(s) => PkixBase64Key(s),
        other => other.into_value::<PkixBase64Key>("pkix-base64-key")?,
    };
    Ok(Box::new(key))
}

pub fn pkix_base64_cert_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let cert = match input {
        ChoiceInput::None => PkixBase64Cert::default(),
        ChoiceInput::Text(s) => PkixBase64Cert(s),
        other => other.into_value::<PkixBase64Cert>("pkix-base64-cert")?,
    };
    Ok(Box::new(cert))
}

pub fn pkix_base64_cert_path_factory(input: ChoiceInput) -> Result<Box<dyn ChoiceValue>> {
    let path = match input {
        ChoiceInput::None => PkixBase64CertPath::default(),
        ChoiceInput::Text(s) => PkixBase64CertPath(s),
        other => other.into_value::<PkixBase64CertPath>("pkix-base64-cert-path")?,
    };
    Ok(Box::new(path))
}

#[cfg(test)]
#[rustfmt::skip::macros(vec)]
mod tests {
    use super::*;
    use crate::{digest::HashAlgorithm, test::SerdeTestCase};
    use coset::iana;
    use openssl::{bn::BigNumContext, ec::{EcGroup, EcKey, PointConversionForm}, nid::Nid};

    pub(crate) const TEST_CERT: &str = "-----BEGIN CERTIFICATE-----
MIIBGDCBv6ADAgECAgEBMAoGCCqGSM49BAMCMBYxFDASBgNVBAMMC0FDTUUgU2ln
bmVyMB4XDTI0MDEwMTAwMDAwMFoXDTM0MDEwMTAwMDAwMFowFjEUMBIGA1UEAwwL
QUNNRSBTaWduZXIwWTATBgcqhkjOPQIBBggqhkjOPQMBBwNCAARHHD51jEkEKFu6
flMRjtD1JK3rB1fSW9L457DXbfpxTN1SD3rKiouResw39R3o8Mm7462Fg4LnAtwl
oS0J96hYMAoGCCqGSM49BAMCA0gAMEUCIEICyoU8iDEx9Kvi4ImqhC9Mpu203jsW
yYReQ/4ILwtaAiEAoKhWgR5Jtdr82ZKvZp/v31tr3sV7fs9kVNoZAw0Qalg=
-----END CERTIFICATE-----
";

    const TEST_KEY: &str = "-----BEGIN PUBLIC KEY-----
MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAERxw+dYxJBChbun5TEY7Q9SSt6wdX
0lvS+Oew1236cUzdUg96yoqLkXrMN/Ud6PDJu+OthYOC5wLcJaEtCfeoWA==
-----END PUBLIC KEY-----
";

    #[test]
    fn test_pkix_variants_valid() {
        CryptoKey::new(TEST_KEY, "pkix-base64-key").unwrap().valid().unwrap();
        CryptoKey::new(TEST_CERT, "pkix-base64-cert").unwrap().valid().unwrap();
        CryptoKey::new(TEST_CERT, "pkix-base64-cert-path")
            .unwrap()
            .valid()
            .unwrap();

        let err = CryptoKey::new("not a key", "pkix-base64-key")
            .unwrap()
            .valid()
            .err()
            .unwrap()
            .to_string();
        assert!(err.starts_with("invalid pkix-base64-key: invalid PEM public key"), "{err}");

        let err = CryptoKey::new(TEST_KEY, "pkix-base64-cert")
            .unwrap()
            .valid()
            .err()
            .unwrap()
            .to_string();
        assert!(err.starts_with("invalid pkix-base64-cert: invalid PEM certificate"), "{err}");
    }

    #[test]
    fn test_thumbprint_serde() {
        let key = CryptoKey::from_value(Thumbprint(HashEntry::new(
            HashAlgorithm::Sha256_32,
            vec![0xde, 0xad, 0xbe, 0xef],
        )));

        SerdeTestCase {
            value: key.clone(),
            expected_json: r#"{"type":"thumbprint","value":"sha-256-32;3q2+7w=="}"#,
            expected_cbor: vec![
                0xd9, 0x02, 0x2d, // tag(557)
                  0x82, // array(2)
                    0x06, // sha-256-32
                    0x44, // bstr(4)
                      0xde, 0xad, 0xbe, 0xef,
            ],
        }
        .run();

        let by_text = CryptoKey::new("sha-256-32;3q2+7w==", "thumbprint").unwrap();
        assert_eq!(by_text, key);
        key.valid().unwrap();
    }

    #[test]
    fn test_cose_key() {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let ec = EcKey::generate(&group).unwrap();
        let mut ctx = BigNumContext::new().unwrap();
        let point = ec
            .public_key()
            .to_bytes(&group, PointConversionForm::UNCOMPRESSED, &mut ctx)
            .unwrap();
        let (x, y) = point[1..].split_at(32);

        let cose = coset::CoseKeyBuilder::new_ec2_pub_key(
            iana::EllipticCurve::P_256,
            x.to_vec(),
            y.to_vec(),
        )
        .build();
        let encoded = cose.clone().to_vec().unwrap();

        let key = CryptoKey::new(encoded.clone(), "cose-key").unwrap();
        key.valid().unwrap();
        assert_eq!(CryptoKey::new(ChoiceInput::value(cose), "cose-key").unwrap(), key);

        let mut buf: Vec<u8> = vec![];
        ciborium::into_writer(&key, &mut buf).unwrap();
        assert_eq!(&buf[..3], &[0xd9, 0x02, 0x2e]);
        assert_eq!(&buf[3..], encoded.as_slice());

        let decoded: CryptoKey = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(decoded, key);

        let json = serde_json::to_string(&key).unwrap();
        let decoded: CryptoKey = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, key);

        let empty = CryptoKey::new(ChoiceInput::None, "cose-key").unwrap();
        assert!(empty
            .valid()
            .err()
            .unwrap()
            .to_string()
            .starts_with("invalid cose-key: invalid COSE key"));
    }
}
