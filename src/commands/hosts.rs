//! `nectl hosts`: list discovered hosts.
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{FilterOpts, GlobalOpts};
use crate::datatree::Host;
use crate::logging::Logger;

const COLUMNS: [&str; 6] = ["id", "role", "group", "os_name", "os_version", "mgmt_ip"];

fn row(host: &Host) -> [String; 6] {
    let cell = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    [
        host.id(),
        cell(host.role.clone()),
        cell(host.deployment_group.clone()),
        cell(host.os_name.clone()),
        cell(host.os_version.clone()),
        cell(host.mgmt_ip.map(|ip| ip.to_string())),
    ]
}

/// Lay rows out as left-aligned columns under a header.
fn table(hosts: &[Arc<Host>]) -> Vec<String> {
    let rows: Vec<[String; 6]> = hosts.iter().map(|h| row(h)).collect();
    let mut widths = COLUMNS.map(str::len);
    for r in &rows {
        for (w, cell) in widths.iter_mut().zip(r) {
            *w = (*w).max(cell.len());
        }
    }
    let format = |cells: &[&str]| {
        cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let mut lines = vec![format(&COLUMNS)];
    lines.extend(
        rows.iter()
            .map(|r| format(&r.iter().map(String::as_str).collect::<Vec<_>>())),
    );
    lines
}

/// Run the hosts command.
///
/// # Errors
///
/// Returns an error if settings cannot be loaded or discovery fails.
pub fn run(global: &GlobalOpts, filter: &FilterOpts, log: &Logger) -> Result<()> {
    let setup = super::CommandSetup::init(global, filter, log)?;
    if setup.hosts.is_empty() {
        log.warn("no hosts match the filter");
        return Ok(());
    }
    log.stage("Hosts");
    for line in table(&setup.hosts) {
        log.info(&line);
    }
    Ok(())
}
