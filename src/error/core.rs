// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),
    #[error("expecting RFC4122 UUID, got {0} instead")]
    UuidVariant(String),
    #[error("OID must be absolute")]
    OidNotAbsolute,
    #[error("invalid OID: got {0} arcs, expecting at least 3")]
    OidArcs(usize),
    #[error("invalid OID arc: {0}")]
    OidArc(String),
    #[error("invalid OID: first arc {0} is greater than 2")]
    OidFirstArc(u64),
    #[error("invalid OID: second arc {0} is greater than 39")]
    OidSecondArc(u64),
    #[error("malformed OID encoding")]
    MalformedOid,
    #[error("empty UEID")]
    EmptyUeid,
    #[error("unknown UEID type 0x{0:02x}")]
    UeidType(u8),
    #[error("invalid {kind} UEID length: got {len} bytes")]
    UeidLength { kind: &'static str, len: usize },
    #[error("invalid MAC address length: expected 6 or 8 bytes, got {0}")]
    MacAddrLength(usize),
    #[error("invalid MAC address: {0}")]
    InvalidMacAddr(String),
    #[error("invalid IP address length: expected 4 or 16 bytes, got {0}")]
    IpAddrLength(usize),
    #[error("invalid IP address: {0}")]
    InvalidIpAddr(String),
    #[error("empty URI")]
    EmptyUri,
    #[error("URI is not absolute: {0}")]
    UriNotAbsolute(String),
    #[error("unknown hash algorithm {0}")]
    HashAlgorithm(u64),
    #[error("unknown hash algorithm name {0}")]
    HashAlgorithmName(String),
    #[error("length mismatch for hash algorithm {alg}: want {want} bytes, got {got}")]
    DigestLength {
        alg: &'static str,
        want: usize,
        got: usize,
    },
    #[error("malformed hash entry: {0}")]
    MalformedHashEntry(String),
    #[error("no digests")]
    NoDigests,
    #[error("invalid base64: {0}")]
    Base64(String),
    #[error("want {want} bytes, got {got}")]
    ByteLength { want: &'static str, got: usize },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },
}
