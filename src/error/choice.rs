// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChoiceError {
    #[error("unknown {choice} type: {name}")]
    UnknownType { choice: &'static str, name: String },
    #[error("unknown {choice} (CBOR: {hex})")]
    UnknownCbor { choice: &'static str, hex: String },
    #[error("invalid {type_name}: {reason}")]
    Invalid {
        type_name: String,
        reason: Box<crate::Error>,
    },
    #[error("tag {0} is already registered")]
    TagRegistered(u64),
    #[error("{choice} type with name \"{name}\" already exists")]
    NameRegistered { choice: &'static str, name: String },
    #[error("{0} already admits an untagged integer variant")]
    UntaggedRegistered(&'static str),
    #[error("registration closed: {0} registry already in use")]
    RegistryInUse(&'static str),
    #[error("nil value")]
    NilValue,
    #[error("unexpected input for {type_name}: {input}")]
    UnexpectedInput {
        type_name: &'static str,
        input: &'static str,
    },
    #[error("missing \"{0}\" entry in type-choice object")]
    MissingEntry(&'static str),
}
