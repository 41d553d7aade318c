use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::Serialize;
use serde_json::Value;

/// The resolved facts of one host: a name to value mapping.
///
/// Facts are built once per host and then only read; nothing removes a
/// fact after it has been declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Facts(BTreeMap<String, Value>);

impl Facts {
    /// Create an empty fact set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a fact.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Look up a fact holding a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Returns `true` if the fact is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no fact is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate facts in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Render the facts as pretty-printed JSON.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl FromIterator<(String, Value)> for Facts {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Facts {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_str_only_matches_strings() {
        let facts: Facts = [
            ("os_name".to_string(), json!("junos")),
            ("asn".to_string(), json!(65000)),
        ]
        .into_iter()
        .collect();
        assert_eq!(facts.get_str("os_name"), Some("junos"));
        assert_eq!(facts.get_str("asn"), None);
        assert!(facts.contains("asn"));
    }

    #[test]
    fn json_dump_is_sorted() {
        let facts: Facts = [
            ("b".to_string(), json!(1)),
            ("a".to_string(), json!(2)),
        ]
        .into_iter()
        .collect();
        let dump = facts.to_json_pretty();
        assert!(dump.find("\"a\"") < dump.find("\"b\""));
    }
}
