//! `nectl diff`, `nectl apply` and `nectl get`: run drivers on devices.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::cancel::CancelToken;
use crate::cli::{ApplyOpts, DeployOpts, GetOpts, GlobalOpts};
use crate::deploy::{Batch, BatchOutcome, DeployOptions, Method};
use crate::drivers::DriverRegistry;
use crate::logging::Logger;
use crate::settings::Settings;

/// Where a method's outputs go and which of them are worth a file.
struct Sink {
    dir: PathBuf,
    extension: String,
    keep_empty: bool,
}

impl Sink {
    fn for_method(settings: &Settings, method: Method) -> Self {
        match method {
            Method::GetConfig => Self {
                dir: settings.active_configs_path(),
                extension: settings.configs_file_extension.clone(),
                keep_empty: true,
            },
            Method::CompareConfig | Method::ApplyConfig => Self {
                dir: settings.config_diffs_path(),
                extension: settings.diff_file_extension(),
                keep_empty: false,
            },
        }
    }
}

fn run_method(
    global: &GlobalOpts,
    opts: &DeployOpts,
    method: Method,
    tune: impl FnOnce(&mut DeployOptions),
    drivers: &DriverRegistry,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let setup = super::CommandSetup::init(global, &opts.filter, log)?;
    let settings = &setup.settings;
    let registry = match &settings.default_driver {
        Some(name) => drivers.clone().with_default_driver(Some(name.clone())),
        None => drivers.clone(),
    };

    let mut deploy_opts = DeployOptions::from_settings(settings);
    tune(&mut deploy_opts);

    log.stage(&format!("Running {}", method.description()));
    let mut outcome = Batch::new(settings, &registry)
        .with_credentials(opts.credentials.to_credentials())
        .with_options(deploy_opts)
        .with_cancel(cancel.clone())
        .run(&setup.hosts, method, log)?;

    let sink = Sink::for_method(settings, method);
    if !sink.keep_empty {
        outcome.outputs.retain(|_, output| !output.trim().is_empty());
    }

    log.stage("Writing files");
    let written = super::write_outputs(&outcome.outputs, &sink.dir, &sink.extension, log)?;
    log.print_summary();
    report(&outcome, written)
}

fn report(outcome: &BatchOutcome, written: usize) -> Result<()> {
    if !outcome.cancelled.is_empty() {
        bail!(
            "cancelled before {} hosts started, {} hosts failed ({written} files written)",
            outcome.cancelled.len(),
            outcome.errors
        );
    }
    if outcome.errors > 0 {
        bail!("{} hosts failed ({written} files written)", outcome.errors);
    }
    Ok(())
}

/// Run the diff command.
///
/// # Errors
///
/// Returns an error if setup fails or any host failed.
pub fn diff(
    global: &GlobalOpts,
    opts: &DeployOpts,
    drivers: &DriverRegistry,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    run_method(global, opts, Method::CompareConfig, |_| {}, drivers, log, cancel)
}

/// Run the apply command.
///
/// # Errors
///
/// Returns an error if setup fails or any host failed.
pub fn apply(
    global: &GlobalOpts,
    opts: &ApplyOpts,
    drivers: &DriverRegistry,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let rollback = opts.rollback_minutes;
    run_method(
        global,
        &opts.deploy,
        Method::ApplyConfig,
        |o| {
            if let Some(minutes) = rollback {
                o.rollback_minutes = minutes;
            }
        },
        drivers,
        log,
        cancel,
    )
}

/// Run the get command.
///
/// # Errors
///
/// Returns an error if setup fails or any host failed.
pub fn get(
    global: &GlobalOpts,
    opts: &GetOpts,
    drivers: &DriverRegistry,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    run_method(
        global,
        &opts.deploy,
        Method::GetConfig,
        |o| {
            if opts.format.is_some() {
                o.format = opts.format;
            }
            if opts.unsanitized {
                o.sanitized = false;
            }
        },
        drivers,
        log,
        cancel,
    )
}
