// SPDX-License-Identifier: MIT

use crate::error::Error;

/// Result type used by every fallible corimkit operation.
pub type Result<T> = std::result::Result<T, Error>;
