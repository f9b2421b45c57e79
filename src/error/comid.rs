// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComidError {
    #[error("empty tag-id")]
    EmptyTagId,
    #[error("empty entity name")]
    EmptyEntityName,
    #[error("empty roles")]
    NoRoles,
    #[error("role not set")]
    RoleUnset,
    #[error("rel not set")]
    RelUnset,
    #[error("empty role")]
    EmptyRole,
    #[error("empty rel")]
    EmptyRel,
    #[error("unknown role '{0}'")]
    UnknownRole(String),
    #[error("unknown rel '{0}'")]
    UnknownRel(String),
    #[error("{kind} {code} is already registered")]
    CodeRegistered { kind: &'static str, code: i64 },
    #[error("{kind} with name \"{name}\" already exists")]
    NameRegistered { kind: &'static str, name: String },
}
