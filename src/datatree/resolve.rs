//! Fact resolution: merge fact sources along the lookup paths of a host.
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde_json::Value;

use super::action::Action;
use super::facts::Facts;
use super::host::Host;
use super::lookup::expand_lookup_path;
use super::source::{Declaration, FactSource, locate_sources};
use crate::error::{FactsError, NectlError};
use crate::logging::Log;
use crate::parallel::worker_pool;
use crate::settings::Settings;

/// Resolves the facts of hosts from the data tree.
#[derive(Debug, Clone)]
pub struct FactResolver {
    datatree: PathBuf,
    lookup_paths: Vec<String>,
    default_action: Action,
}

impl FactResolver {
    /// Create a resolver over `datatree` with lookup paths ordered general to specific.
    #[must_use]
    pub fn new(datatree: impl Into<PathBuf>, lookup_paths: Vec<String>, default_action: Action) -> Self {
        Self {
            datatree: datatree.into(),
            lookup_paths,
            default_action,
        }
    }

    /// Create a resolver from kit settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.datatree_path(),
            settings.datatree_lookup_paths.clone(),
            settings.default_action,
        )
    }

    /// Root of the data tree.
    #[must_use]
    pub fn datatree(&self) -> &Path {
        &self.datatree
    }

    /// Compute the facts of `host`.
    ///
    /// Every lookup path is expanded before any source is read, so a host
    /// with an unresolvable placeholder fails without partial work.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError::UnresolvedPlaceholder`] if a lookup path needs an
    /// identity field the host lacks, or an error for unreadable/malformed sources.
    pub fn resolve(&self, host: &Host, log: &dyn Log) -> Result<Facts, FactsError> {
        let host_id = host.id();
        let placeholders = host.placeholder_values();
        let relatives = self
            .lookup_paths
            .iter()
            .map(|template| {
                expand_lookup_path(template, &placeholders).map_err(|placeholder| {
                    FactsError::UnresolvedPlaceholder {
                        host: host_id.clone(),
                        placeholder,
                        path: template.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut acc = Accumulator::default();
        for (name, value, frozen) in host.seed_facts() {
            if frozen {
                acc.frozen.insert(name.clone());
            }
            acc.facts.insert(name, value);
        }

        for relative in &relatives {
            let files = locate_sources(&self.datatree, relative)?;
            if files.is_empty() {
                log.debug(&format!("[{host_id}] no fact source at '{relative}'"));
                continue;
            }
            for file in files {
                log.debug(&format!("[{host_id}] loading facts from {}", file.display()));
                let source = FactSource::load(&file)?;
                for decl in source.declarations {
                    acc.declare(decl, self.default_action, &host_id, &file, log);
                }
            }
        }

        Ok(acc.facts.into_iter().collect())
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    facts: BTreeMap<String, Value>,
    frozen: BTreeSet<String>,
}

impl Accumulator {
    fn declare(
        &mut self,
        decl: Declaration,
        default_action: Action,
        host_id: &str,
        path: &Path,
        log: &dyn Log,
    ) {
        let Declaration {
            name,
            value,
            action,
        } = decl;
        let action = action.unwrap_or(default_action);

        if self.frozen.contains(&name) {
            log.warn(&format!(
                "[{host_id}] fact '{name}' is frozen, ignoring {action} declaration in {}",
                path.display()
            ));
            return;
        }

        match action {
            Action::Frozen => {
                self.frozen.insert(name.clone());
                self.facts.insert(name, value);
            }
            Action::Replace => {
                self.facts.insert(name, value);
            }
            Action::Merge => {
                let merged = match self.facts.remove(&name) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                self.facts.insert(name, merged);
            }
        }
    }
}

/// Merge a more specific value into the accumulated one.
///
/// Lists put the specific items first. Mappings merge key by key with the
/// same rules. Anything else, including mismatched types, is replaced.
#[must_use]
pub fn merge_values(existing: Value, new: Value) -> Value {
    match (existing, new) {
        (Value::Array(general), Value::Array(mut specific)) => {
            specific.extend(general);
            Value::Array(specific)
        }
        (Value::Object(mut general), Value::Object(specific)) => {
            for (key, value) in specific {
                let merged = match general.remove(&key) {
                    Some(old) => merge_values(old, value),
                    None => value,
                };
                general.insert(key, merged);
            }
            Value::Object(general)
        }
        (_, new) => new,
    }
}

/// Resolve the facts of every host on a bounded pool.
///
/// Stops at the first failure; fact errors abort the whole run.
///
/// # Errors
///
/// Returns the first fact error encountered, or a pool construction error.
pub fn resolve_all(
    hosts: &[Arc<Host>],
    resolver: &FactResolver,
    jobs: usize,
    log: &dyn Log,
) -> Result<(), NectlError> {
    let pool = worker_pool(jobs)?;
    pool.install(|| {
        hosts
            .par_iter()
            .try_for_each(|host| host.facts(resolver, log).map(|_| ()))
    })?;
    Ok(())
}
