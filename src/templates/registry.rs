use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::section::{Section, SectionError};
use crate::datatree::Facts;
use crate::error::{RenderError, SectionFailure};
use crate::logging::Log;

/// A named, ordered collection of sections.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    sections: Vec<Section>,
}

impl Template {
    /// Create an empty template.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: Vec::new(),
        }
    }

    /// Append a section.
    #[must_use]
    pub fn section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// Append a section only when `include` is true.
    #[must_use]
    pub fn section_if(self, include: bool, section: Section) -> Self {
        if include { self.section(section) } else { self }
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sections in declaration order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Run every section in order and join their outputs with a blank line.
    ///
    /// A failing section is logged and the remaining sections still run so
    /// that every problem is reported in one pass. If any section failed,
    /// the whole output is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SectionsFailed`] if one or more sections failed.
    pub fn render(&self, host_id: &str, facts: &Facts, log: &dyn Log) -> Result<String, RenderError> {
        let mut outputs = Vec::with_capacity(self.sections.len());
        let mut failures = Vec::new();

        for section in &self.sections {
            match section.run(facts) {
                Ok(text) if text.is_empty() => {
                    log.debug(&format!("[{host_id}] section '{}' is empty", section.name()));
                }
                Ok(text) => outputs.push(text),
                Err(error) => {
                    match &error {
                        SectionError::MissingFact(_) => {
                            log.error(&format!("[{host_id}] section '{}' {error}", section.name()));
                        }
                        SectionError::Failed(_) | SectionError::Panicked(_) => log.error(&format!(
                            "[{host_id}] section '{}' failed: {error}",
                            section.name()
                        )),
                    }
                    failures.push(SectionFailure {
                        section: section.name().to_string(),
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(RenderError::SectionsFailed {
                host: host_id.to_string(),
                failures,
            });
        }
        Ok(outputs.join("\n\n"))
    }
}

/// Builds a template for one host from that host's facts.
pub type TemplateLoader = dyn Fn(&Facts) -> Result<Template, String> + Send + Sync;

/// Maps OS names to template loaders.
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    loaders: BTreeMap<String, Arc<TemplateLoader>>,
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("os_names", &self.loaders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TemplateRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader for `os_name`, replacing any previous one.
    #[must_use]
    pub fn register<F>(mut self, os_name: impl Into<String>, loader: F) -> Self
    where
        F: Fn(&Facts) -> Result<Template, String> + Send + Sync + 'static,
    {
        self.loaders.insert(os_name.into(), Arc::new(loader));
        self
    }

    /// Register a template whose sections never depend on facts.
    #[must_use]
    pub fn register_static(self, os_name: impl Into<String>, template: Template) -> Self {
        self.register(os_name, move |_| Ok(template.clone()))
    }

    /// OS names with a registered template.
    pub fn os_names(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    /// Build the template for `os_name` from the rendering host's facts.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::TemplateMissing`] if nothing is registered and
    /// [`RenderError::TemplateImport`] if the loader fails.
    pub fn load(&self, os_name: &str, facts: &Facts) -> Result<Template, RenderError> {
        let loader = self
            .loaders
            .get(os_name)
            .ok_or_else(|| RenderError::TemplateMissing {
                os_name: os_name.to_string(),
            })?;
        loader(facts).map_err(|reason| RenderError::TemplateImport {
            os_name: os_name.to_string(),
            reason,
        })
    }
}
