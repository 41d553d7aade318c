//! Configuration formats and secret redaction.
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Format of a configuration document exchanged with a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    /// `set`/`delete` statements, loaded incrementally.
    Set,
    /// Hierarchical CLI text.
    Text,
    /// XML document.
    Xml,
    /// JSON document.
    Json,
}

impl ConfigFormat {
    /// Returns `true` for formats loaded statement by statement, where a full
    /// replace is emulated with a `delete` before the new statements.
    #[must_use]
    pub const fn is_line_oriented(self) -> bool {
        matches!(self, Self::Set)
    }

    /// Guess the format of a staged document from its first statement.
    #[must_use]
    pub fn detect(config: &str) -> Option<Self> {
        let first = config.trim_start();
        if first.starts_with('<') {
            Some(Self::Xml)
        } else if first.starts_with('{') {
            Some(Self::Json)
        } else if first.starts_with("set ") || first.starts_with("delete ") {
            Some(Self::Set)
        } else {
            None
        }
    }

    /// Lowercase name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Text => "text",
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(Self::Set),
            "text" => Ok(Self::Text),
            "xml" => Ok(Self::Xml),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown config format '{other}'")),
        }
    }
}

static SECRET_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)(?P<key>\b(?:encrypted-password|secret|authentication-key|pre-shared-key|community|password|key)\s+)(?P<value>"[^"]*"|\S+)"#,
    )
    .ok()
});

/// Replace secret values in a configuration with a placeholder.
#[must_use]
pub fn sanitize(config: &str) -> String {
    match SECRET_RE.as_ref() {
        Some(re) => re.replace_all(config, "${key}<removed>").into_owned(),
        None => config.to_string(),
    }
}
