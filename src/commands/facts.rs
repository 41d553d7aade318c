//! `nectl facts`: print resolved facts as JSON.
use std::io::{self, Write as _};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::{Map, Value};

use crate::cli::{FilterOpts, GlobalOpts};
use crate::datatree::{FactResolver, Host, resolve_all};
use crate::logging::Logger;

/// JSON object of host id to facts, for hosts whose facts are resolved.
fn facts_document(hosts: &[Arc<Host>]) -> Result<String> {
    let mut document = Map::new();
    for host in hosts {
        if let Some(facts) = host.resolved_facts() {
            document.insert(host.id(), serde_json::to_value(&*facts)?);
        }
    }
    Ok(serde_json::to_string_pretty(&Value::Object(document))?)
}

/// Run the facts command.
///
/// # Errors
///
/// Returns an error if settings cannot be loaded, discovery fails or any
/// host's facts cannot be resolved.
pub fn run(global: &GlobalOpts, filter: &FilterOpts, log: &Arc<Logger>) -> Result<()> {
    let setup = super::CommandSetup::init(global, filter, log)?;
    let resolver = FactResolver::from_settings(&setup.settings);

    log.stage("Resolving facts");
    resolve_all(&setup.hosts, &resolver, setup.settings.jobs, &**log)?;

    let document = facts_document(&setup.hosts)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{document}").context("writing facts to stdout")?;
    Ok(())
}
