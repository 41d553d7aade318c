//! `nectl render`: render configs into the staged directory.
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::cli::{FilterOpts, GlobalOpts};
use crate::datatree::FactResolver;
use crate::logging::Logger;
use crate::templates::{TemplateRegistry, render_hosts};

/// Run the render command.
///
/// Configs of hosts that rendered are written even when others failed.
///
/// # Errors
///
/// Returns an error if facts cannot be resolved, the staged directory cannot
/// be written, or any host failed to render.
pub fn run(
    global: &GlobalOpts,
    filter: &FilterOpts,
    templates: &TemplateRegistry,
    log: &Arc<Logger>,
) -> Result<()> {
    let setup = super::CommandSetup::init(global, filter, log)?;
    let settings = &setup.settings;
    let resolver = FactResolver::from_settings(settings);

    log.stage("Rendering configs");
    let report = render_hosts(&setup.hosts, &resolver, templates, settings.jobs, log)?;

    log.stage("Writing configs");
    let written = super::write_outputs(
        &report.configs,
        &settings.staged_configs_path(),
        &settings.configs_file_extension,
        log,
    )?;
    log.print_summary();

    let errors = report.error_count();
    if errors > 0 {
        bail!("{errors} hosts failed to render ({written} configs written)");
    }
    log.info(&format!("rendered {written} configs"));
    Ok(())
}
