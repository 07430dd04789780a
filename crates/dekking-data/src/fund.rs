//! Pension fund identifiers.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Identifier of a pension fund as published in the coverage-ratio table.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into, Serialize, Deserialize,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct FundId(String);

impl FundId {
    /// Create a fund identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FundId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for FundId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
