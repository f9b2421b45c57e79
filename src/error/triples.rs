// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriplesError {
    #[error("triples struct must not be empty")]
    EmptyTriples,
    #[error("environment must not be empty")]
    EmptyEnvironment,
    #[error("class must not be empty")]
    EmptyClass,
    #[error("no measurement value set")]
    NoMeasurementValue,
    #[error("no measurement entries")]
    NoMeasurements,
    #[error("no keys")]
    NoKeys,
    #[error("no series entries")]
    NoSeries,
    #[error("empty version")]
    EmptyVersion,
    #[error("raw-value-mask set without raw-value")]
    MaskWithoutRawValue,
    #[error("invalid range: min {min} is greater than max {max}")]
    InvalidRange { min: i64, max: i64 },
    #[error("invalid negative integer key")]
    NegativeRegisterKey,
    #[error("unexpected key type for index: {0}")]
    RegisterKeyType(String),
}
