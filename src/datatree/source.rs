use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::action::Action;
use crate::error::FactsError;

/// Private key holding per-fact actions inside a fact source.
const ACTIONS_KEY: &str = "_actions";

/// File stem holding a directory source's own declarations.
const INDEX_STEM: &str = "index";

const EXTENSIONS: &[&str] = &["toml", "json"];

/// One fact declared by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Fact name.
    pub name: String,
    /// Declared value.
    pub value: Value,
    /// Explicit action, `None` to use the configured default.
    pub action: Option<Action>,
}

/// A parsed fact document.
#[derive(Debug, Clone)]
pub struct FactSource {
    /// Where the document was read from.
    pub path: PathBuf,
    /// Public declarations in name order.
    pub declarations: Vec<Declaration>,
}

impl FactSource {
    /// Read and parse a fact document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// TOML/JSON document whose top level is a table.
    pub fn load(path: &Path) -> Result<Self, FactsError> {
        let content = fs::read_to_string(path).map_err(|source| FactsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// Parse a fact document, choosing the format from `path`'s extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is malformed.
    pub fn parse(path: &Path, content: &str) -> Result<Self, FactsError> {
        let malformed = |message: String| FactsError::MalformedSource {
            path: path.to_path_buf(),
            message,
        };
        let document = parse_table(path, content).map_err(malformed)?;

        let actions = match document.get(ACTIONS_KEY) {
            None => BTreeMap::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, action)| {
                    let action = action
                        .as_str()
                        .ok_or_else(|| format!("action for '{name}' must be a string"))?
                        .parse::<Action>()
                        .map_err(|e| format!("action for '{name}': {e}"))?;
                    Ok((name.clone(), action))
                })
                .collect::<Result<BTreeMap<_, _>, String>>()
                .map_err(malformed)?,
            Some(_) => return Err(malformed(format!("'{ACTIONS_KEY}' must be a table"))),
        };

        let declarations = document
            .into_iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, value)| Declaration {
                action: actions.get(&name).copied(),
                name,
                value,
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            declarations,
        })
    }
}

/// Parse a document into its top-level table, converted to JSON values.
pub(super) fn parse_table(path: &Path, content: &str) -> Result<BTreeMap<String, Value>, String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;
            Ok(table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect())
        }
        Some("json") => match serde_json::from_str::<Value>(content).map_err(|e| e.to_string())? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Err("top level must be an object".to_string()),
        },
        _ => Err("unsupported fact source extension".to_string()),
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map_or_else(|| Value::String(f.to_string()), Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn with_extension_appended(base: &Path, ext: &str) -> PathBuf {
    let mut os: OsString = base.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

fn is_fact_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXTENSIONS.contains(&e))
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| !n.starts_with('.') && !n.starts_with('_'))
}

/// Files making up the source at `relative` under `datatree`, in load order.
///
/// `relative.toml` or `relative.json` is a single source. Otherwise a
/// directory named `relative` loads its `index` document first, then every
/// other document in lexicographic order. Subdirectories are not descended
/// into. A missing source yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be listed.
pub fn locate_sources(datatree: &Path, relative: &str) -> Result<Vec<PathBuf>, FactsError> {
    let base = datatree.join(relative);
    if let Some(file) = EXTENSIONS
        .iter()
        .map(|ext| with_extension_appended(&base, ext))
        .find(|p| p.is_file())
    {
        return Ok(vec![file]);
    }
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&base).map_err(|source| FactsError::Io {
        path: base.clone(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| is_fact_file(p))
        .collect();
    files.sort_by(|a, b| {
        let a_index = a.file_stem().is_some_and(|s| s == INDEX_STEM);
        let b_index = b.file_stem().is_some_and(|s| s == INDEX_STEM);
        b_index.cmp(&a_index).then_with(|| a.file_name().cmp(&b.file_name()))
    });
    Ok(files)
}
