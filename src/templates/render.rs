//! Per-host rendering and the concurrent batch renderer.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use super::registry::TemplateRegistry;
use crate::datatree::{FactResolver, Facts, Host, resolve_all};
use crate::error::{FactsError, NectlError, RenderError};
use crate::logging::{BufferedLog, HostStatus, Log, Logger};
use crate::parallel::worker_pool;

/// Render one host whose facts are already resolved.
///
/// Returns `Ok(None)` for hosts without `os_name` or `os_version`; they are
/// skipped rather than failed. The template is loaded from this host's own
/// facts, so nothing about one host leaks into another's render.
///
/// # Errors
///
/// Returns an error if no template matches, the template fails to load, or
/// any of its sections fail.
pub fn render_host(
    host: &Host,
    facts: &Facts,
    registry: &TemplateRegistry,
    log: &dyn Log,
) -> Result<Option<String>, RenderError> {
    let host_id = host.id();
    let (Some(os_name), Some(_)) = (host.attr("os_name"), host.attr("os_version")) else {
        log.warn(&format!(
            "[{host_id}] skipping render due to missing 'os_name' or 'os_version'"
        ));
        return Ok(None);
    };

    let template = registry.load(&os_name, facts)?;
    log.debug(&format!(
        "[{host_id}] rendering {} sections from template '{}'",
        template.sections().len(),
        template.name()
    ));
    template.render(&host_id, facts, log).map(Some)
}

/// Outcome of rendering a set of hosts.
#[derive(Debug, Default)]
pub struct RenderReport {
    /// Rendered configs keyed by host id.
    pub configs: BTreeMap<String, String>,
    /// Hosts whose render failed, with the reason.
    pub failures: BTreeMap<String, RenderError>,
    /// Hosts skipped for lack of OS information.
    pub skipped: Vec<String>,
}

impl RenderReport {
    /// Number of hosts that failed to render.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }
}

/// Resolve facts for and render every host on a bounded pool.
///
/// Render failures are isolated per host and reported in the
/// [`RenderReport`]; fact errors abort the whole run.
///
/// # Errors
///
/// Returns an error if fact resolution fails for any host or the worker
/// pool cannot be built.
pub fn render_hosts(
    hosts: &[Arc<Host>],
    resolver: &FactResolver,
    registry: &TemplateRegistry,
    jobs: usize,
    log: &Arc<Logger>,
) -> Result<RenderReport, NectlError> {
    let started = Instant::now();
    resolve_all(hosts, resolver, jobs, &**log)?;
    log.debug(&format!("start rendering {} hosts", hosts.len()));

    let pool = worker_pool(jobs)?;
    let results = pool.install(|| {
        hosts
            .par_iter()
            .map(|host| {
                let buf = BufferedLog::new(Arc::clone(log));
                let outcome = host
                    .facts(resolver, &buf)
                    .map(|facts| render_host(host, &facts, registry, &buf));
                buf.flush();
                outcome.map(|rendered| (host.id(), rendered))
            })
            .collect::<Result<Vec<_>, FactsError>>()
    })?;

    let mut report = RenderReport::default();
    for (host_id, rendered) in results {
        match rendered {
            Ok(Some(config)) => {
                log.record_host(&host_id, HostStatus::Ok, None);
                report.configs.insert(host_id, config);
            }
            Ok(None) => {
                log.record_host(&host_id, HostStatus::Skipped, Some("missing os"));
                report.skipped.push(host_id);
            }
            Err(e) => {
                log.error(&format!("[{host_id}] {e}"));
                log.record_host(&host_id, HostStatus::Failed, Some(&e.to_string()));
                report.failures.insert(host_id, e);
            }
        }
    }

    log.info(&format!(
        "finished rendering {} hosts ({:.4}s)",
        hosts.len(),
        started.elapsed().as_secs_f64()
    ));
    Ok(report)
}
