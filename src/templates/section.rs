use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::datatree::Facts;

/// Body of a section: reads its bound arguments and writes config lines.
pub type SectionBody =
    dyn Fn(&SectionArgs<'_>, &mut ConfigWriter) -> anyhow::Result<()> + Send + Sync;

/// Why a section produced no output.
#[derive(Error, Debug)]
pub enum SectionError {
    /// A required fact is not declared for the host.
    #[error("needs fact: {0}")]
    MissingFact(String),

    /// The body returned an error.
    #[error("{0:#}")]
    Failed(anyhow::Error),

    /// The body panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}

/// One unit of configuration generation.
///
/// Parameters are declared explicitly: required facts must be present,
/// optional facts fall back to their default.
#[derive(Clone)]
pub struct Section {
    name: String,
    required: Vec<String>,
    optional: Vec<(String, Value)>,
    body: Arc<SectionBody>,
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

impl Section {
    /// Create a section with no parameters.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&SectionArgs<'_>, &mut ConfigWriter) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            required: Vec::new(),
            optional: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// Declare a required fact.
    #[must_use]
    pub fn require(mut self, fact: impl Into<String>) -> Self {
        self.required.push(fact.into());
        self
    }

    /// Declare an optional fact with its default.
    #[must_use]
    pub fn optional(mut self, fact: impl Into<String>, default: impl Into<Value>) -> Self {
        self.optional.push((fact.into(), default.into()));
        self
    }

    /// Section name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Required fact names in declaration order.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Bind declared parameters from `facts`.
    ///
    /// # Errors
    ///
    /// Returns the name of the first required fact that is missing.
    pub fn bind<'a>(&'a self, facts: &'a Facts) -> Result<SectionArgs<'a>, SectionError> {
        let mut values = BTreeMap::new();
        for name in &self.required {
            let value = facts
                .get(name)
                .ok_or_else(|| SectionError::MissingFact(name.clone()))?;
            values.insert(name.as_str(), value);
        }
        for (name, default) in &self.optional {
            values.insert(name.as_str(), facts.get(name).unwrap_or(default));
        }
        Ok(SectionArgs {
            section: &self.name,
            values,
        })
    }

    /// Run the section against `facts` and return its trimmed output.
    ///
    /// Leading and trailing newlines are removed; an empty string means the
    /// section chose to emit nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a required fact is missing or the body fails.
    pub fn run(&self, facts: &Facts) -> Result<String, SectionError> {
        let args = self.bind(facts)?;
        let mut writer = ConfigWriter::new();
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.body)(&args, &mut writer)));
        match outcome {
            Ok(Ok(())) => Ok(writer.into_string().trim_matches('\n').to_string()),
            Ok(Err(e)) => Err(SectionError::Failed(e)),
            Err(payload) => Err(SectionError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Arguments bound for one section call.
#[derive(Debug)]
pub struct SectionArgs<'a> {
    section: &'a str,
    values: BTreeMap<&'a str, &'a Value>,
}

impl<'a> SectionArgs<'a> {
    /// Raw value of a declared parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the section did not declare `name`.
    pub fn value(&self, name: &str) -> anyhow::Result<&'a Value> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("section '{}' does not declare '{name}'", self.section))
    }

    /// Deserialize a declared parameter into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is undeclared or has the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self.value(name)?;
        T::deserialize(value).with_context(|| format!("fact '{name}' has an unexpected type"))
    }

    /// A declared parameter that must be a string.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is undeclared or not a string.
    pub fn str(&self, name: &str) -> anyhow::Result<&'a str> {
        self.value(name)?
            .as_str()
            .ok_or_else(|| anyhow!("fact '{name}' must be a string"))
    }
}

/// Call-scoped output buffer handed to a section body.
#[derive(Debug, Default)]
pub struct ConfigWriter {
    buf: String,
}

impl ConfigWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line.
    pub fn line(&mut self, line: impl AsRef<str>) {
        self.buf.push_str(line.as_ref());
        self.buf.push('\n');
    }

    /// Returns `true` if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer and return its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.buf
    }
}

impl fmt::Write for ConfigWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buf.push_str(s);
        Ok(())
    }
}
