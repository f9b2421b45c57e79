// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoseError {
    #[error("{0}")]
    Openssl(String),
    #[error("{0}")]
    Coset(String),
    #[error("invalid JWK: {0}")]
    Jwk(String),
    #[error("unsupported key type {0}")]
    UnsupportedKey(String),
    #[error("unsupported EC curve {0}")]
    UnsupportedCurve(String),
    #[error("unsupported COSE algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("key does not contain a private component")]
    MissingPrivateKey,
    #[error("missing algorithm in protected header")]
    MissingAlgorithm,
    #[error("missing content type in protected header")]
    MissingContentType,
    #[error("unexpected content type {0}")]
    ContentType(String),
    #[error("missing CoRIM meta in protected header")]
    MissingMeta,
    #[error("missing payload")]
    MissingPayload,
    #[error("signature must be {want} bytes, got {got}")]
    SignatureLength { want: usize, got: usize },
    #[error("signature verification failed")]
    InvalidSignature,
}
