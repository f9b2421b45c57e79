// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("unexpected extension point: {0}")]
    UnexpectedPoint(String),
    #[error("extension point {0} is already registered")]
    AlreadyRegistered(String),
    #[error("registration closed: extension registry already in use")]
    RegistryInUse,
    #[error("unknown flag {0}")]
    UnknownFlag(String),
}
