// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorimError {
    #[error("empty id")]
    EmptyId,
    #[error("no tags")]
    NoTags,
    #[error("empty tag")]
    EmptyTag,
    #[error("unrecognized tag prefix {0}")]
    UnknownTagPrefix(String),
    #[error("invalid validity: not-before {not_before} is after not-after {not_after}")]
    InvalidValidity {
        not_before: String,
        not_after: String,
    },
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),
    #[error("empty signer name")]
    EmptySignerName,
    #[error("did not see unsigned CoRIM tag")]
    MissingCorimTag,
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
    #[error("unknown CoRIM role '{0}'")]
    UnknownRole(String),
    #[error("invalid CoRIM role {0}")]
    InvalidRole(i64),
}
