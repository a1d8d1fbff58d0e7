//! Parsing of the dotenv-style credentials file.

use std::collections::HashMap;

/// Key/value pairs read from a credentials file.
#[derive(Debug, Clone, Default)]
pub(crate) struct CredentialsFile {
    values: HashMap<String, String>,
}

impl CredentialsFile {
    /// Parses `KEY=value` lines. Comments, `export` prefixes and quoting follow
    /// dotenv rules.
    pub(crate) fn parse(contents: &str) -> Result<Self, dotenvy::Error> {
        let mut values = HashMap::new();
        for item in dotenvy::from_read_iter(contents.as_bytes()) {
            let (key, value) = item?;
            values.insert(key, value);
        }

        Ok(Self { values })
    }

    /// Returns the trimmed, non-empty value for `key`.
    pub(crate) fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    /// Whether the file defines no keys at all.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
