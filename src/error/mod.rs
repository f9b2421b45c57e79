// SPDX-License-Identifier: MIT

mod choice;
mod comid;
mod core;
mod corim;
mod cose;
mod extensions;
mod triples;

pub use choice::*;
pub use comid::*;
pub use self::core::*;
pub use corim::*;
pub use cose::*;
use derive_more::From;
pub use extensions::*;
use std::fmt::Display;
pub use triples::*;

#[derive(Debug, From)]
pub enum Error {
    Choice(ChoiceError),
    Comid(ComidError),
    Core(CoreError),
    Corim(CorimError),
    Cose(CoseError),
    Extension(ExtensionError),
    Triples(TriplesError),
    /// A nested component failed validation.
    #[from(ignore)]
    Validation { field: String, source: Box<Error> },
    #[from(ignore)]
    Context(String, Box<Error>),
    /// Errors bubbled up from the CBOR or JSON codec.
    #[from(ignore)]
    Encoding(String),
    #[from(ignore)]
    Custom(String),
}

impl Error {
    /// Wraps `source` as the failed validation of `field`.
    pub fn validation<E: Into<Error>>(field: impl Into<String>, source: E) -> Self {
        Self::Validation {
            field: field.into(),
            source: Box::new(source.into()),
        }
    }

    /// Prefixes this error with `context`.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context(context.into(), Box::new(self))
    }

    pub fn custom<T: Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }

    pub fn encoding<T: Display>(msg: T) -> Self {
        Self::Encoding(msg.to_string())
    }
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::Choice(err) => write!(f, "{err}"),
            Self::Comid(err) => write!(f, "{err}"),
            Self::Core(err) => write!(f, "{err}"),
            Self::Corim(err) => write!(f, "{err}"),
            Self::Cose(err) => write!(f, "{err}"),
            Self::Extension(err) => write!(f, "{err}"),
            Self::Triples(err) => write!(f, "{err}"),
            Self::Validation { field, source } => {
                write!(f, "{field} validation failed: {source}")
            }
            Self::Context(ctx, err) => write!(f, "{ctx}: {err}"),
            Self::Encoding(msg) => write!(f, "{msg}"),
            Self::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(value: ciborium::de::Error<std::io::Error>) -> Self {
        match value {
            ciborium::de::Error::Semantic(_, msg) => Self::Encoding(msg),
            other => Self::Encoding(other.to_string()),
        }
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(value: ciborium::ser::Error<std::io::Error>) -> Self {
        match value {
            ciborium::ser::Error::Value(msg) => Self::Encoding(msg),
            other => Self::Encoding(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Encoding(value.to_string())
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(value: openssl::error::ErrorStack) -> Self {
        Self::Cose(CoseError::Openssl(value.to_string()))
    }
}

impl From<coset::CoseError> for Error {
    fn from(value: coset::CoseError) -> Self {
        Self::Cose(CoseError::Coset(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_chain_display() {
        let err = Error::validation(
            "triples",
            Error::from(TriplesError::NoMeasurements).context("reference value at index 0"),
        );

        assert_eq!(
            err.to_string(),
            "triples validation failed: reference value at index 0: no measurement entries"
        );
    }

    #[test]
    fn test_semantic_cbor_error_is_flattened() {
        let err: Error =
            ciborium::de::Error::<std::io::Error>::Semantic(None, "boom".to_string()).into();

        assert_eq!(err.to_string(), "boom");
    }
}
