use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a re-declared fact combines with the value accumulated so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// The new value overwrites the existing one.
    #[default]
    #[serde(alias = "replace_with")]
    Replace,
    /// Lists are prepended, mappings are deep-merged.
    #[serde(alias = "merge_with")]
    Merge,
    /// The first frozen value wins and later declarations are ignored.
    Frozen,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Replace => "replace",
            Self::Merge => "merge",
            Self::Frozen => "frozen",
        };
        f.write_str(name)
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" | "replace_with" => Ok(Self::Replace),
            "merge" | "merge_with" => Ok(Self::Merge),
            "frozen" => Ok(Self::Frozen),
            other => Err(format!(
                "unknown action '{other}', expected replace, merge or frozen"
            )),
        }
    }
}
