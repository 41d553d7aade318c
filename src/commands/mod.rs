//! Top-level subcommand orchestration.
//!
//! The `nectl` binary runs with an empty [`Toolkit`]: hosts, facts and the
//! device commands work on any kit, but rendering needs templates. A kit
//! ships its templates (and any extra drivers) by building its own binary
//! that registers them and calls [`main`].

pub mod deploy;
pub mod facts;
pub mod hosts;
pub mod render;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cancel::CancelToken;
use crate::cli::{Cli, Command, FilterOpts, GlobalOpts};
use crate::datatree::{Host, discover_hosts};
use crate::drivers::DriverRegistry;
use crate::logging::{self, Logger};
use crate::settings::Settings;
use crate::templates::TemplateRegistry;

/// Templates and drivers compiled into a kit binary.
#[derive(Debug, Clone, Default)]
pub struct Toolkit {
    /// Templates by OS name.
    pub templates: TemplateRegistry,
    /// Driver overrides and named drivers on top of the built-ins.
    pub drivers: DriverRegistry,
}

/// Parse the command line and run it with `toolkit`.
///
/// # Errors
///
/// Returns an error if the command fails; the binary maps it to exit code 1.
pub fn main(toolkit: &Toolkit) -> Result<()> {
    use clap::Parser as _;
    run(Cli::parse(), toolkit)
}

/// Run an already parsed command line.
///
/// # Errors
///
/// Returns an error if the command fails.
pub fn run(cli: Cli, toolkit: &Toolkit) -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let name = cli.command.name();
    logging::init_subscriber(cli.verbose, name);
    let log = Arc::new(Logger::new(name));
    dispatch(cli, toolkit, &log, &CancelToken::install_ctrlc())
}

/// Run a command against an existing logger and cancel token.
///
/// # Errors
///
/// Returns an error if the command fails.
pub fn dispatch(cli: Cli, toolkit: &Toolkit, log: &Arc<Logger>, cancel: &CancelToken) -> Result<()> {
    match cli.command {
        Command::Hosts(filter) => hosts::run(&cli.global, &filter, log),
        Command::Facts(filter) => facts::run(&cli.global, &filter, log),
        Command::Render(filter) => render::run(&cli.global, &filter, &toolkit.templates, log),
        Command::Diff(opts) => deploy::diff(&cli.global, &opts, &toolkit.drivers, log, cancel),
        Command::Apply(opts) => deploy::apply(&cli.global, &opts, &toolkit.drivers, log, cancel),
        Command::Get(opts) => deploy::get(&cli.global, &opts, &toolkit.drivers, log, cancel),
        Command::Version => {
            let version = option_env!("NECTL_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
            log.info(&format!("nectl {version}"));
            Ok(())
        }
    }
}

/// Shared state produced by the common command setup sequence.
///
/// Loads settings and discovers the hosts selected by the filter so each
/// command does not repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Kit settings, with command-line overrides applied.
    pub settings: Settings,
    /// Hosts matching the filter, in id order.
    pub hosts: Vec<Arc<Host>>,
}

impl CommandSetup {
    /// Load settings and discover hosts.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be loaded or host discovery
    /// fails.
    pub fn init(global: &GlobalOpts, filter: &FilterOpts, log: &Logger) -> Result<Self> {
        log.stage("Loading settings");
        let mut settings = Settings::load(global.settings.as_deref())?;
        if let Some(jobs) = global.jobs {
            settings.jobs = jobs.max(1);
        }
        log.debug(&format!("settings: {}", settings.settings_path.display()));
        log.debug(&format!("kit: {}", settings.kit_path.display()));

        log.stage("Discovering hosts");
        let all = discover_hosts(&settings)?;
        let hosts = filter.to_filter().apply(&all);
        log.info(&format!(
            "found {} hosts, {} selected",
            all.len(),
            hosts.len()
        ));

        Ok(Self { settings, hosts })
    }
}

/// Write one file per host into `dir`, replacing whatever was there.
///
/// # Errors
///
/// Returns an error if the directory cannot be recreated or a file written.
pub(crate) fn write_outputs(
    outputs: &BTreeMap<String, String>,
    dir: &Path,
    extension: &str,
    log: &Logger,
) -> Result<usize> {
    let written = crate::artifacts::write_configs_to_dir(outputs, dir, extension)
        .with_context(|| format!("writing files to {}", dir.display()))?;
    log.info(&format!("wrote {written} files to {}", dir.display()));
    Ok(written)
}
