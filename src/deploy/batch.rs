//! Run one driver method across many hosts.
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, SendError};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use super::confirm::{self, Confirmed, Parked};
use super::connection::ScopedConnection;
use crate::cancel::CancelToken;
use crate::datatree::Host;
use crate::drivers::{
    ApplyProgress, ConfigFormat, DriverError, DriverRegistry, DriverTarget, PendingCommit, StagedConfig,
};
use crate::error::NectlError;
use crate::logging::{BufferedLog, HostStatus, Log, Logger};
use crate::parallel::worker_pool;
use crate::settings::Settings;

/// Driver method run by a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Fetch the running configuration.
    GetConfig,
    /// Diff the staged configuration against the running one.
    CompareConfig,
    /// Commit the staged configuration with commit-confirm.
    ApplyConfig,
}

impl Method {
    /// Description used in log lines.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::GetConfig => "getting configs",
            Self::CompareConfig => "comparing configs",
            Self::ApplyConfig => "applying configs",
        }
    }
}

/// Login details that take precedence over the hosts' own.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Username for every host.
    pub username: Option<String>,
    /// Password for every host.
    pub password: Option<String>,
    /// SSH private key file for every host.
    pub ssh_key: Option<PathBuf>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssh_key", &self.ssh_key)
            .finish()
    }
}

/// Tunables of a batch run.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Hosts processed concurrently.
    pub jobs: usize,
    /// Rollback timer armed by apply, in minutes.
    pub rollback_minutes: u32,
    /// Config format for get and staged configs; `None` lets the backend pick.
    pub format: Option<ConfigFormat>,
    /// Fetch running configs with secrets removed.
    pub sanitized: bool,
    /// Replace the settle period computed by the driver.
    pub settle_override: Option<Duration>,
}

impl DeployOptions {
    /// Options taken from kit settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            jobs: settings.jobs,
            rollback_minutes: settings.commit_rollback_minutes,
            format: settings.configs_format,
            sanitized: settings.configs_sanitized,
            settle_override: None,
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Hosts whose method failed.
    pub errors: usize,
    /// Output per host id: config text or diff. Hosts lost after a commit
    /// carry the diff that was committed.
    pub outputs: BTreeMap<String, String>,
    /// Hosts without `os_name` or `mgmt_ip`.
    pub skipped: Vec<String>,
    /// Hosts not started because the batch was cancelled.
    pub cancelled: Vec<String>,
}

impl BatchOutcome {
    fn record(&mut self, log: &Logger, host_id: String, result: Result<String, DriverError>) {
        match result {
            Ok(output) => {
                log.record_host(&host_id, HostStatus::Ok, None);
                self.outputs.insert(host_id, output);
            }
            Err(e) => {
                log.error(&format!("[{host_id}] {e}"));
                log.record_host(&host_id, HostStatus::Failed, Some(&e.to_string()));
                self.errors += 1;
                if let Some(diff) = e.carried_diff() {
                    self.outputs.insert(host_id, diff.to_string());
                }
            }
        }
    }

    /// Record confirm results. A committed host with no result is failed
    /// with the diff it committed.
    fn record_confirmations(
        &mut self,
        log: &Logger,
        mut queued: BTreeMap<String, String>,
        confirmed: Vec<Confirmed>,
    ) {
        for (host_id, result) in confirmed {
            queued.remove(&host_id);
            self.record(log, host_id, result);
        }
        for (host_id, diff) in queued {
            let error = confirm::unconfirmed(diff, "confirmation never reported back");
            self.record(log, host_id, Err(error));
        }
    }
}

enum HostRun {
    Done(Result<String, DriverError>),
    Parked(Parked),
    Queued { diff: String },
    Skipped,
    Cancelled,
}

enum Invoked {
    Output(String),
    Committed(PendingCommit),
}

/// A configured batch, ready to run methods against hosts.
#[derive(Debug)]
pub struct Batch<'a> {
    settings: &'a Settings,
    registry: &'a DriverRegistry,
    credentials: Credentials,
    opts: DeployOptions,
    cancel: CancelToken,
}

impl<'a> Batch<'a> {
    /// Batch using `registry` with options from `settings`.
    #[must_use]
    pub fn new(settings: &'a Settings, registry: &'a DriverRegistry) -> Self {
        Self {
            settings,
            registry,
            credentials: Credentials::default(),
            opts: DeployOptions::from_settings(settings),
            cancel: CancelToken::new(),
        }
    }

    /// Override host credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Replace the options taken from settings.
    #[must_use]
    pub fn with_options(mut self, opts: DeployOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Stop starting hosts once `cancel` trips.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `method` on every host.
    ///
    /// Driver failures are isolated per host and counted in the outcome;
    /// they never stop the remaining hosts.
    ///
    /// # Errors
    ///
    /// Returns an error only if the worker pool cannot be built.
    pub fn run(
        &self,
        hosts: &[Arc<Host>],
        method: Method,
        log: &Arc<Logger>,
    ) -> Result<BatchOutcome, NectlError> {
        let started = Instant::now();
        let description = method.description();
        log.debug(&format!("start {description}"));

        let pool = worker_pool(self.opts.jobs)?;
        let (park, parked) = mpsc::channel::<Parked>();
        let (runs, confirmed) = thread::scope(|s| {
            let scheduler = s.spawn(move || confirm::run_scheduler(&parked, log));
            let runs: Vec<(String, HostRun)> = pool.install(|| {
                hosts
                    .par_iter()
                    .map_with(park, |park, host| {
                        let host_id = host.id();
                        if self.cancel.is_cancelled() {
                            return (host_id, HostRun::Cancelled);
                        }
                        let buf = BufferedLog::new(Arc::clone(log));
                        let run = self.run_host(host, method, &buf);
                        buf.flush();
                        let run = match run {
                            HostRun::Parked(p) => {
                                let diff = p.pending.diff.clone();
                                match park.send(p) {
                                    Ok(()) => HostRun::Queued { diff },
                                    Err(SendError(p)) => HostRun::Done(confirm::confirm(p, log).1),
                                }
                            }
                            other => other,
                        };
                        (host_id, run)
                    })
                    .collect()
            });
            let confirmed = scheduler.join().unwrap_or_else(|_| {
                log.error("confirm scheduler panicked");
                Vec::new()
            });
            (runs, confirmed)
        });

        let mut outcome = BatchOutcome::default();
        let mut queued = BTreeMap::new();
        for (host_id, run) in runs {
            match run {
                HostRun::Done(result) => outcome.record(log, host_id, result),
                HostRun::Skipped => {
                    log.record_host(&host_id, HostStatus::Skipped, Some("missing os_name or mgmt_ip"));
                    outcome.skipped.push(host_id);
                }
                HostRun::Cancelled => {
                    log.record_host(&host_id, HostStatus::Cancelled, None);
                    outcome.cancelled.push(host_id);
                }
                HostRun::Queued { diff } => {
                    queued.insert(host_id, diff);
                }
                HostRun::Parked(p) => {
                    queued.insert(host_id, p.pending.diff);
                }
            }
        }
        outcome.record_confirmations(log, queued, confirmed);

        log.info(&format!(
            "finished {description} ({:.4}s)",
            started.elapsed().as_secs_f64()
        ));
        Ok(outcome)
    }

    fn target(&self, host: &Host, os_name: String, address: IpAddr) -> DriverTarget {
        let mut target = DriverTarget::new(host.id(), os_name, address).with_settings(self.settings);
        target.username = self
            .credentials
            .username
            .clone()
            .or_else(|| host.attr("username"));
        target.password = self
            .credentials
            .password
            .clone()
            .or_else(|| host.attr("password"));
        target.ssh_key.clone_from(&self.credentials.ssh_key);
        target
    }

    fn run_host(&self, host: &Host, method: Method, log: &dyn Log) -> HostRun {
        let host_id = host.id();
        let (Some(os_name), Some(address)) = (host.attr("os_name"), host.mgmt_ip) else {
            log.warn(&format!(
                "[{host_id}] skipping due to missing 'os_name' or 'mgmt_ip'"
            ));
            return HostRun::Skipped;
        };

        let target = self.target(host, os_name, address);
        let driver = match self.registry.create(&target) {
            Ok(driver) => driver,
            Err(e) => return HostRun::Done(Err(e)),
        };
        let mut conn = match ScopedConnection::open(driver, log) {
            Ok(conn) => conn,
            Err(e) => return HostRun::Done(Err(e)),
        };
        match self.invoke(&mut conn, &host_id, method, log) {
            Ok(Invoked::Output(output)) => HostRun::Done(Ok(output)),
            // The confirm reuses this connection, so it outlives the guard.
            Ok(Invoked::Committed(pending)) => match conn.detach() {
                Some(driver) => HostRun::Parked(Parked::new(driver, pending)),
                None => HostRun::Done(Err(DriverError::NotConnected {
                    method: "confirm_commit",
                })),
            },
            Err(e) => HostRun::Done(Err(e)),
        }
    }

    fn invoke(
        &self,
        conn: &mut ScopedConnection<'_>,
        host_id: &str,
        method: Method,
        log: &dyn Log,
    ) -> Result<Invoked, DriverError> {
        let staged = || {
            StagedConfig::new(self.settings.staged_config_file(host_id)).with_format(self.opts.format)
        };
        let driver = conn.driver()?;
        match method {
            Method::GetConfig => driver
                .get_config(self.opts.format, self.opts.sanitized, log)
                .map(Invoked::Output),
            Method::CompareConfig => driver.compare_config(&staged(), log).map(Invoked::Output),
            Method::ApplyConfig => match driver.begin_apply(&staged(), self.opts.rollback_minutes, log)? {
                ApplyProgress::Unchanged => Ok(Invoked::Output(String::new())),
                ApplyProgress::Pending(mut pending) => {
                    if let Some(settle) = self.opts.settle_override {
                        pending.settle = settle;
                    }
                    Ok(Invoked::Committed(pending))
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::deploy::testing::{Recorder, Script, ScriptedDriver};
    use crate::drivers::Driver;
    use crate::logging::isolated_logger;
    use std::fs;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    type Recorders = Arc<Mutex<BTreeMap<String, Recorder>>>;

    fn kit() -> (tempfile::TempDir, Settings) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nectl.toml");
        fs::write(
            &path,
            "datatree_lookup_paths = [\"common\"]\nhosts_glob_pattern = \"hosts/*.toml\"\nhosts_hostname_regex = \"hosts/(.+)\\\\.toml\"\njobs = 2\n",
        )
        .unwrap();
        let settings = Settings::from_file(&path).unwrap();
        (dir, settings)
    }

    fn stage(settings: &Settings, host_id: &str) {
        let file = settings.staged_config_file(host_id);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, "system { host-name x; }\n").unwrap();
    }

    fn host(name: &str, octet: u8) -> Arc<Host> {
        let mut host = Host::new(name).with_os("junos", "20.4R3");
        host.mgmt_ip = Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, octet)));
        Arc::new(host)
    }

    fn scripted(scripts: BTreeMap<&str, Script>) -> (DriverRegistry, Recorders) {
        let scripts: BTreeMap<String, Script> =
            scripts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let recorders = Recorders::default();
        let seen = Arc::clone(&recorders);
        let registry = DriverRegistry::default().with_override("junos", move |target: &DriverTarget| {
            let script = scripts.get(&target.host_id).cloned().unwrap_or_default();
            let (driver, recorder) = ScriptedDriver::new(&target.host_id, script);
            seen.lock().unwrap().insert(target.host_id.clone(), recorder);
            Box::new(driver) as Box<dyn Driver>
        });
        (registry, recorders)
    }

    fn fast(settings: &Settings) -> DeployOptions {
        DeployOptions {
            settle_override: Some(Duration::ZERO),
            ..DeployOptions::from_settings(settings)
        }
    }

    fn changed() -> Script {
        Script {
            diff: "[edit system]\n+  host-name x;".to_string(),
            ..Script::default()
        }
    }

    #[test]
    fn get_config_skips_hosts_without_address() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let (_dir, settings) = kit();
        let (registry, _) = scripted(BTreeMap::new());
        let mut bare = Host::new("edge0").with_os("junos", "20.4R3");
        bare.mgmt_ip = None;

        let outcome = Batch::new(&settings, &registry)
            .run(&[host("core0", 1), Arc::new(bare)], Method::GetConfig, &log)
            .unwrap();
        assert_eq!(outcome.errors, 0);
        assert_eq!(outcome.outputs["core0"], "running config of core0 as text");
        assert_eq!(outcome.skipped, ["edge0"]);
    }

    #[test]
    fn missing_staged_config_fails_only_that_host() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let (_dir, settings) = kit();
        stage(&settings, "core0");
        let (registry, recorders) = scripted(BTreeMap::from([("core0", changed()), ("core1", changed())]));

        let outcome = Batch::new(&settings, &registry)
            .run(&[host("core0", 1), host("core1", 2)], Method::CompareConfig, &log)
            .unwrap();
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.outputs.len(), 1);
        assert!(outcome.outputs["core0"].contains("host-name"));
        assert!(recorders.lock().unwrap()["core1"].closed());
    }

    #[test]
    fn apply_confirms_after_settling() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let (_dir, settings) = kit();
        stage(&settings, "core0");
        stage(&settings, "core1");
        let (registry, recorders) = scripted(BTreeMap::from([("core0", changed())]));

        let outcome = Batch::new(&settings, &registry)
            .with_options(fast(&settings))
            .run(&[host("core0", 1), host("core1", 2)], Method::ApplyConfig, &log)
            .unwrap();
        assert_eq!(outcome.errors, 0);
        assert!(outcome.outputs["core0"].contains("host-name"));
        assert_eq!(outcome.outputs["core1"], "");

        let recorders = recorders.lock().unwrap();
        assert_eq!(recorders["core0"].commits(), 1);
        assert_eq!(recorders["core0"].confirms(), 1);
        assert!(recorders["core0"].closed());
        assert_eq!(recorders["core1"].commits(), 0);
        assert!(recorders["core1"].closed());
    }

    #[test]
    fn host_lost_after_commit_keeps_diff_and_counts_once() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let (_dir, settings) = kit();
        stage(&settings, "core0");
        stage(&settings, "core1");
        let lost = Script {
            lose_after_commit: true,
            ..changed()
        };
        let (registry, recorders) = scripted(BTreeMap::from([("core0", lost), ("core1", changed())]));

        let outcome = Batch::new(&settings, &registry)
            .with_options(fast(&settings))
            .run(&[host("core0", 1), host("core1", 2)], Method::ApplyConfig, &log)
            .unwrap();
        assert_eq!(outcome.errors, 1);
        assert!(outcome.outputs["core0"].contains("host-name"));
        assert!(outcome.outputs["core1"].contains("host-name"));
        assert_eq!(recorders.lock().unwrap()["core1"].confirms(), 1);
    }

    #[test]
    fn unknown_os_is_isolated() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let (_dir, settings) = kit();
        let (registry, _) = scripted(BTreeMap::new());
        let mut ios = Host::new("edge0").with_os("ios", "15.2");
        ios.mgmt_ip = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let outcome = Batch::new(&settings, &registry)
            .run(&[Arc::new(ios), host("core0", 1)], Method::GetConfig, &log)
            .unwrap();
        assert_eq!(outcome.errors, 1);
        assert!(outcome.outputs.contains_key("core0"));
        assert!(!outcome.outputs.contains_key("edge0"));
    }

    #[test]
    fn cancelled_batch_starts_nothing() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let (_dir, settings) = kit();
        let (registry, recorders) = scripted(BTreeMap::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = Batch::new(&settings, &registry)
            .with_cancel(cancel)
            .run(&[host("core0", 1), host("core1", 2)], Method::GetConfig, &log)
            .unwrap();
        assert_eq!(outcome.cancelled, ["core0", "core1"]);
        assert!(outcome.outputs.is_empty());
        assert!(recorders.lock().unwrap().is_empty());
    }

    #[test]
    fn credential_overrides_win_over_host() {
        let (_dir, settings) = kit();
        let registry = DriverRegistry::default();
        let mut h = Host::new("core0").with_os("junos", "20.4R3");
        h.username = Some("netops".to_string());
        h.password = Some("host-secret".to_string());

        let plain = Batch::new(&settings, &registry);
        let target = plain.target(&h, "junos".to_string(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(target.username.as_deref(), Some("netops"));

        let overridden = Batch::new(&settings, &registry).with_credentials(Credentials {
            password: Some("cli-secret".to_string()),
            ssh_key: Some(PathBuf::from("/keys/id_ed25519")),
            ..Credentials::default()
        });
        let target = overridden.target(&h, "junos".to_string(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(target.username.as_deref(), Some("netops"));
        assert_eq!(target.password.as_deref(), Some("cli-secret"));
        assert_eq!(target.ssh_key, Some(PathBuf::from("/keys/id_ed25519")));
        assert_eq!(target.commit_comment, settings.commit_comment);
    }

    #[test]
    fn parked_commit_is_confirmed_after_cancellation() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let (_dir, settings) = kit();
        stage(&settings, "core0");
        stage(&settings, "core1");
        let cancel = CancelToken::new();
        let tripping = Script {
            cancel_on_commit: Some(cancel.clone()),
            ..changed()
        };
        let (registry, recorders) = scripted(BTreeMap::from([
            ("core0", tripping.clone()),
            ("core1", tripping),
        ]));
        let opts = DeployOptions {
            jobs: 1,
            settle_override: Some(Duration::from_millis(50)),
            ..DeployOptions::from_settings(&settings)
        };

        let outcome = Batch::new(&settings, &registry)
            .with_options(opts)
            .with_cancel(cancel.clone())
            .run(&[host("core0", 1), host("core1", 2)], Method::ApplyConfig, &log)
            .unwrap();
        assert!(cancel.is_cancelled());
        assert_eq!(outcome.errors, 0);
        assert_eq!(outcome.cancelled.len(), 1);
        assert_eq!(outcome.outputs.len(), 1);
        let (committed, diff) = outcome.outputs.iter().next().unwrap();
        assert!(diff.contains("host-name"));

        let recorders = recorders.lock().unwrap();
        assert_eq!(recorders.len(), 1);
        assert_eq!(recorders[committed].commits(), 1);
        assert_eq!(recorders[committed].confirms(), 1);
        assert!(recorders[committed].closed());
    }

    #[test]
    fn panicking_confirm_fails_only_that_host() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let (_dir, settings) = kit();
        stage(&settings, "core0");
        stage(&settings, "core1");
        let boom = Script {
            panic_confirm: true,
            ..changed()
        };
        let (registry, _) = scripted(BTreeMap::from([("core0", boom), ("core1", changed())]));

        let outcome = Batch::new(&settings, &registry)
            .with_options(fast(&settings))
            .run(&[host("core0", 1), host("core1", 2)], Method::ApplyConfig, &log)
            .unwrap();
        assert_eq!(outcome.errors, 1);
        assert!(outcome.outputs["core0"].contains("host-name"));
        assert!(outcome.outputs["core1"].contains("host-name"));
        assert_eq!(log.failure_count(), 1);
    }

    #[test]
    fn commit_without_confirm_result_is_a_failure() {
        let (log, _tmp, _guard) = isolated_logger();
        let mut outcome = BatchOutcome::default();
        let queued = BTreeMap::from([
            ("core0".to_string(), "+ a".to_string()),
            ("core1".to_string(), "+ b".to_string()),
        ]);
        let confirmed = vec![("core1".to_string(), Ok("+ b".to_string()))];

        outcome.record_confirmations(&log, queued, confirmed);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.outputs["core0"], "+ a");
        assert_eq!(outcome.outputs["core1"], "+ b");
        assert_eq!(log.failure_count(), 1);
    }

    #[test]
    fn method_descriptions() {
        assert_eq!(Method::ApplyConfig.description(), "applying configs");
        assert_eq!(Method::GetConfig.description(), "getting configs");
    }
}
