//! Ordered dot-path configuration parameters.
//!
//! [`ConfigParams`] is a flat, insertion-ordered map of string keys to string
//! values. Nested structure is expressed with dot paths (`connection.host`,
//! `connections.2.port`) and extracted with [`ConfigParams::section`].

use serde_json::Value;

/// An insertion-ordered map of configuration keys to string values.
///
/// Order is significant: the connection resolver builds host lists and URI
/// query strings in the order keys were first inserted.
///
/// # Example
///
/// ```ignore
/// use couchlayer_core::config::ConfigParams;
///
/// let config = ConfigParams::from_tuples([
///     ("bucket", "test"),
///     ("connection.host", "localhost"),
///     ("connection.port", "8091"),
/// ]);
///
/// assert_eq!(config.section("connection").get("host"), Some("localhost"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigParams {
    entries: Vec<(String, String)>,
}

impl ConfigParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Builds parameters from key/value pairs. Later duplicates override earlier ones.
    pub fn from_tuples<K, V>(tuples: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut config = Self::new();
        for (key, value) in tuples {
            config.set(key, value);
        }
        config
    }

    /// Flattens a nested JSON value into dot-path parameters.
    ///
    /// Object members and array elements become path segments, scalars are
    /// stored in their textual form and `null` members are skipped.
    pub fn from_value(value: &Value) -> Self {
        let mut config = Self::new();
        flatten_into(&mut config, "", value);
        config
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value for `key`, treating empty strings as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    /// Returns `true` when `key` is present, even with an empty value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key`, keeping its original position if it was already present.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes `key`, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses common boolean spellings such as `true`, `1` or `yes`, falling back to `default`.
    pub fn get_as_bool_or(&self, key: &str, default: bool) -> bool {
        match self.get_non_empty(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "y" | "t") => true,
            Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "n" | "f") => false,
            _ => default,
        }
    }

    /// Parses the value as an unsigned integer.
    pub fn get_as_usize(&self, key: &str) -> Option<usize> {
        self.get_non_empty(key).and_then(|v| v.trim().parse().ok())
    }

    /// Like [`get_as_usize`](Self::get_as_usize), falling back to `default`.
    pub fn get_as_usize_or(&self, key: &str, default: usize) -> usize {
        self.get_as_usize(key).unwrap_or(default)
    }

    /// Returns the non-empty value of `key` or `default`.
    pub fn get_as_string_or(&self, key: &str, default: &str) -> String {
        self.get_non_empty(key).unwrap_or(default).to_string()
    }

    /// Extracts every parameter under `name.` with the prefix stripped.
    pub fn section(&self, name: &str) -> ConfigParams {
        let prefix = format!("{name}.");

        self.entries
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect()
    }

    /// Lists the distinct first path segments of dotted keys, in order of appearance.
    pub fn section_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();

        for (key, _) in &self.entries {
            if let Some((head, _)) = key.split_once('.') {
                if !names.iter().any(|n| n == head) {
                    names.push(head.to_string());
                }
            }
        }

        names
    }

    /// Returns a copy of `self` with every entry of `other` applied on top.
    pub fn merge(&self, other: &ConfigParams) -> ConfigParams {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.set(key, value);
        }
        merged
    }
}

impl FromIterator<(String, String)> for ConfigParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        ConfigParams::from_tuples(iter)
    }
}

fn flatten_into(config: &mut ConfigParams, prefix: &str, value: &Value) {
    let join = |segment: &str| {
        if prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{prefix}.{segment}")
        }
    };

    match value {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_into(config, &join(key), value);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                flatten_into(config, &join(&index.to_string()), value);
            }
        }
        Value::Null => {}
        Value::String(s) => config.set(prefix, s.clone()),
        other => config.set(prefix, other.to_string()),
    }
}
