// SPDX-License-Identifier: MIT

//! # corimkit
//!
//! A Rust implementation of the Concise Reference Integrity Manifest (CoRIM)
//! and Concise Module Identifier (CoMID) data models.
//!
//! This library provides types and structures for working with:
//! - CoMID tags: reference values, endorsements and verification keys
//! - CoRIM manifests bundling CoMID, CoSWID and CoTS tags
//! - COSE_Sign1 signed CoRIMs
//!
//! Every document type encodes to CBOR and to JSON through [`CborCodec`] and
//! [`JsonCodec`], and is validated on the way in and on the way out.
//!
//! Type-choice values (class ids, measurement keys, crypto keys, ...) and
//! profile extensions are open: applications register their own variants and
//! extensions at start-up, before the first document is encoded or decoded.

/// The type-choice framework and its registries
pub mod choice;

/// Validation and the CBOR/JSON entry points
pub mod codec;

/// CoMID tags, entities and linked tags
pub mod comid;

/// Primitive values shared across the data model
pub mod core;

/// Unsigned CoRIM manifests
pub mod corim;

/// COSE_Sign1 signed CoRIMs
pub mod cose;

/// Crypto key type choice
pub mod crypto_key;

/// Hash entries and digests
pub mod digest;

/// Environments and their identifiers
pub mod environment;

/// Profile extensions
pub mod extensions;

/// Integrity registers
pub mod integrity_registers;

/// Measurements and measurement values
pub mod measurement;

/// openssl backed COSE signer and verifier
pub mod openssl;

/// PSA and CCA profile identifiers
pub mod profiles;

/// Triple types used in CoMID tags
pub mod triples;

/// Fixed Bytes Arrays
pub mod fixed_bytes;

/// Macros for easier implementation definitions.
pub(crate) mod macros;

/// Errors for easily handling problems.
pub mod error;

/// Custom corimkit Results.
pub mod result;

/// Provides the Empty Trait.
pub mod empty;

/// Test utilities
#[cfg(test)]
pub(crate) mod test;

pub use self::core::*;
pub use codec::{CborCodec, JsonCodec, Validate};
pub use crypto_key::CryptoKey;
pub use digest::*;
pub use error::*;
pub use fixed_bytes::*;
pub use integrity_registers::*;
pub use result::*;
