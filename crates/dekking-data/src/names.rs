//! Instrument display names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lookup from instrument short code to display name.
///
/// Only used when presenting results; the model works on short codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentNames(BTreeMap<String, String>);

impl InstrumentNames {
    /// Create an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a display name.
    pub fn insert(&mut self, short_name: impl Into<String>, long_name: impl Into<String>) {
        self.0.insert(short_name.into(), long_name.into());
    }

    /// Display name for a code, if known.
    pub fn get(&self, short_name: &str) -> Option<&str> {
        self.0.get(short_name).map(String::as_str)
    }

    /// Display name for a code, falling back to the code itself.
    pub fn display<'a>(&'a self, short_name: &'a str) -> &'a str {
        self.get(short_name).unwrap_or(short_name)
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no names are registered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over (short, long) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for InstrumentNames {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_falls_back_to_code() {
        let mut names = InstrumentNames::new();
        names.insert("IWDA.AS", "MSCI World");

        assert_eq!(names.display("IWDA.AS"), "MSCI World");
        assert_eq!(names.display("EUSA30"), "EUSA30");
        assert_eq!(names.len(), 1);
    }
}
