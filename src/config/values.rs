//! Typed access to loosely-structured configuration maps.
//!
//! Driver and change-source declarations carry open-ended parameter maps
//! (credentials, endpoints). [`ConfigMap`] reads them with strong types,
//! returning a typed missing/invalid-field error instead of a bare
//! lookup.

use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};

/// A typed view over a named configuration section.
#[derive(Debug, Clone, Copy)]
pub struct ConfigMap<'a> {
    section: &'a str,
    map: &'a BTreeMap<String, serde_json::Value>,
}

impl<'a> ConfigMap<'a> {
    /// Creates a typed view over `map`, attributing errors to `section`.
    #[must_use]
    pub const fn new(section: &'a str, map: &'a BTreeMap<String, serde_json::Value>) -> Self {
        Self { section, map }
    }

    /// Reads a required string field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when absent and
    /// [`ConfigError::WrongType`] when not a string.
    pub fn get_str(&self, field: &str) -> Result<&'a str> {
        let value = self.map.get(field).ok_or_else(|| ConfigError::MissingField {
            section: self.section.to_string(),
            field: field.to_string(),
        })?;

        value.as_str().ok_or_else(|| {
            ConfigError::WrongType {
                section: self.section.to_string(),
                field: field.to_string(),
                expected: "string",
            }
            .into()
        })
    }

    /// Reads an optional string field, substituting a default when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WrongType`] when present but not a string.
    pub fn get_str_or(&self, field: &str, default: &'a str) -> Result<&'a str> {
        match self.map.get(field) {
            None => Ok(default),
            Some(value) => value.as_str().ok_or_else(|| {
                ConfigError::WrongType {
                    section: self.section.to_string(),
                    field: field.to_string(),
                    expected: "string",
                }
                .into()
            }),
        }
    }

    /// Reads an optional unsigned integer field with a default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WrongType`] when present but not an integer.
    pub fn get_u64_or(&self, field: &str, default: u64) -> Result<u64> {
        match self.map.get(field) {
            None => Ok(default),
            Some(value) => value.as_u64().ok_or_else(|| {
                ConfigError::WrongType {
                    section: self.section.to_string(),
                    field: field.to_string(),
                    expected: "integer",
                }
                .into()
            }),
        }
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.map.contains_key(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvergeError;
    use serde_json::json;

    fn sample() -> BTreeMap<String, serde_json::Value> {
        let mut map = BTreeMap::new();
        map.insert(String::from("key"), json!("secret"));
        map.insert(String::from("ttl"), json!(60));
        map
    }

    #[test]
    fn test_get_str() {
        let map = sample();
        let values = ConfigMap::new("driver", &map);
        assert_eq!(values.get_str("key").expect("present"), "secret");
    }

    #[test]
    fn test_missing_field_is_typed() {
        let map = sample();
        let values = ConfigMap::new("driver", &map);
        let err = values.get_str("secret").expect_err("absent");
        assert!(matches!(
            err,
            ConvergeError::Config(crate::error::ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_wrong_type_is_typed() {
        let map = sample();
        let values = ConfigMap::new("driver", &map);
        let err = values.get_str("ttl").expect_err("integer, not string");
        assert!(matches!(
            err,
            ConvergeError::Config(crate::error::ConfigError::WrongType { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        let map = sample();
        let values = ConfigMap::new("driver", &map);
        assert_eq!(values.get_u64_or("ttl", 0).expect("present"), 60);
        assert_eq!(values.get_u64_or("interval", 30).expect("default"), 30);
        assert_eq!(values.get_str_or("region", "auto").expect("default"), "auto");
    }
}
