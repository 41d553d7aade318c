//! Arista EOS eAPI backend.
//!
//! JSON-RPC `runCmds` over HTTPS. The candidate is an EOS configuration
//! session named after this process; it survives reconnects so a pending
//! `commit timer` can be confirmed from a fresh connection.
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use super::backend::{Backend, LoadMode};
use super::error::{BackendError, RpcError};
use super::format::ConfigFormat;
use super::registry::DriverTarget;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// eAPI JSON-RPC error code for a rejected command.
const ERR_INVALID_COMMAND: i64 = 1002;

/// eAPI client for one EOS device.
pub struct EapiBackend {
    target: DriverTarget,
    url: String,
    agent: Option<ureq::Agent>,
    session: Option<String>,
    request_id: u64,
}

impl fmt::Debug for EapiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EapiBackend")
            .field("url", &self.url)
            .field("connected", &self.agent.is_some())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

fn endpoint(address: IpAddr) -> String {
    match address {
        IpAddr::V4(v4) => format!("https://{v4}/command-api"),
        IpAddr::V6(v6) => format!("https://[{v6}]/command-api"),
    }
}

/// `commit timer` argument for a rollback after `minutes`.
fn commit_timer(minutes: u32) -> String {
    format!("commit timer {:02}:{:02}:00", minutes / 60, minutes % 60)
}

/// Commands loading `config` into session `name`.
fn load_commands(name: &str, config: &str, mode: LoadMode) -> Vec<String> {
    let mut cmds = vec![format!("configure session {name}")];
    if mode == LoadMode::Replace {
        cmds.push("rollback clean-config".to_string());
    }
    cmds.extend(
        config
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('!'))
            .filter(|l| l.trim() != "end")
            .map(str::to_string),
    );
    cmds.push("end".to_string());
    cmds
}

/// Sessions of `show configuration sessions` that hold uncommitted or
/// unconfirmed changes.
fn pending_sessions(reply: &Value) -> Vec<String> {
    reply
        .get("sessions")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
        .filter(|(_, session)| {
            matches!(
                session.get("state").and_then(Value::as_str),
                Some("pending" | "pendingCommitTimer")
            )
        })
        .map(|(name, _)| name.clone())
        .collect()
}

fn map_transport(e: ureq::Error) -> BackendError {
    match e {
        ureq::Error::StatusCode(code @ (401 | 403)) => BackendError::Auth(format!("HTTP {code}")),
        ureq::Error::StatusCode(code) => BackendError::Protocol(format!("HTTP {code}")),
        ureq::Error::Timeout(t) => BackendError::Timeout(t.to_string()),
        ureq::Error::Io(e) => BackendError::Unreachable(e.to_string()),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            BackendError::Unreachable(e.to_string())
        }
        other => BackendError::Protocol(other.to_string()),
    }
}

/// Turn a JSON-RPC error object into a backend error.
fn map_rpc_error(error: &Value) -> BackendError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown eAPI error")
        .to_string();
    let details: Vec<RpcError> = error
        .get("data")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|d| d.get("errors").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .map(|m| RpcError {
            message: m.to_string(),
            ..RpcError::default()
        })
        .collect();
    let lower = message.to_lowercase();
    if lower.contains("lock") {
        BackendError::Lock(message)
    } else if error.get("code").and_then(Value::as_i64) == Some(ERR_INVALID_COMMAND) {
        if details.is_empty() {
            BackendError::Rejected(vec![RpcError {
                message,
                ..RpcError::default()
            }])
        } else {
            BackendError::Rejected(details)
        }
    } else {
        BackendError::Protocol(message)
    }
}

impl EapiBackend {
    /// Backend for `target`; no request is made until [`Backend::connect`].
    #[must_use]
    pub fn new(target: &DriverTarget) -> Self {
        Self {
            target: target.clone(),
            url: endpoint(target.address),
            agent: None,
            session: None,
            request_id: 0,
        }
    }

    fn build_agent(&self) -> ureq::Agent {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(!self.target.tls_verify)
            .build();
        ureq::Agent::config_builder()
            .timeout_connect(Some(self.target.connect_timeout))
            .timeout_global(Some(self.target.rpc_timeout))
            .tls_config(tls)
            .build()
            .into()
    }

    fn authorization(&self) -> String {
        let user = self.target.username.as_deref().unwrap_or_default();
        let password = self.target.password.as_deref().unwrap_or_default();
        format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
    }

    /// Run `cmds` and return one result per command.
    fn run_cmds(&mut self, cmds: &[String], text: bool) -> Result<Vec<Value>, BackendError> {
        self.request_id += 1;
        let body = json!({
            "jsonrpc": "2.0",
            "method": "runCmds",
            "params": {
                "version": 1,
                "cmds": cmds,
                "format": if text { "text" } else { "json" },
            },
            "id": format!("nectl-{}", self.request_id),
        });
        let authorization = self.authorization();
        let agent = self
            .agent
            .as_ref()
            .ok_or_else(|| BackendError::Protocol("no eAPI connection".to_string()))?;
        let reply: Value = agent
            .post(&self.url)
            .header("Authorization", &authorization)
            .header("Content-Type", "application/json")
            .send_json(&body)
            .map_err(map_transport)?
            .body_mut()
            .read_json()
            .map_err(map_transport)?;

        if let Some(error) = reply.get("error") {
            return Err(map_rpc_error(error));
        }
        reply
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| BackendError::Protocol("eAPI reply has no result".to_string()))
    }

    fn session_name(&self) -> Result<String, BackendError> {
        self.session
            .clone()
            .ok_or_else(|| BackendError::Protocol("no configuration session".to_string()))
    }

    /// `output` of the last command of a text-format request.
    fn text_output(results: &[Value]) -> String {
        results
            .last()
            .and_then(|r| r.get("output"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

impl Backend for EapiBackend {
    fn connect(&mut self) -> Result<(), BackendError> {
        self.agent = Some(self.build_agent());
        if let Err(e) = self.run_cmds(&["show version".to_string()], false) {
            self.agent = None;
            return Err(e);
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BackendError> {
        self.agent = None;
        Ok(())
    }

    fn default_format(&self) -> ConfigFormat {
        ConfigFormat::Text
    }

    fn running_config(
        &mut self,
        format: ConfigFormat,
        sanitized: bool,
    ) -> Result<String, BackendError> {
        let cmd = if sanitized {
            "show running-config sanitized".to_string()
        } else {
            "show running-config".to_string()
        };
        match format {
            ConfigFormat::Text => {
                let results = self.run_cmds(&[cmd], true)?;
                Ok(Self::text_output(&results).trim().to_string())
            }
            ConfigFormat::Json => {
                let results = self.run_cmds(&[cmd], false)?;
                let config = results.into_iter().next().unwrap_or_default();
                serde_json::to_string_pretty(&config)
                    .map_err(|e| BackendError::Protocol(e.to_string()))
            }
            other => Err(BackendError::Protocol(format!(
                "config format '{other}' is not supported by eAPI"
            ))),
        }
    }

    /// eAPI is stateless, so EOS's `configure lock` cannot outlive a single
    /// request. The candidate is a configuration session of our own instead,
    /// and the device counts as locked while any other session is pending
    /// or waiting on a commit timer.
    fn lock(&mut self) -> Result<(), BackendError> {
        let results = self.run_cmds(&["show configuration sessions".to_string()], false)?;
        let busy = results.first().map(pending_sessions).unwrap_or_default();
        if !busy.is_empty() {
            return Err(BackendError::Lock(format!(
                "configuration sessions in progress: {}",
                busy.join(", ")
            )));
        }
        let name = format!(
            "nectl-{}-{}",
            std::process::id(),
            SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        self.run_cmds(&[format!("configure session {name}"), "end".to_string()], false)?;
        self.session = Some(name);
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), BackendError> {
        self.session = None;
        Ok(())
    }

    fn load(
        &mut self,
        config: &str,
        format: ConfigFormat,
        mode: LoadMode,
    ) -> Result<(), BackendError> {
        if matches!(format, ConfigFormat::Xml | ConfigFormat::Json) {
            return Err(BackendError::Rejected(vec![RpcError {
                message: format!("config format '{format}' is not supported by eAPI"),
                ..RpcError::default()
            }]));
        }
        // EOS has no `delete` statement to wipe a session; start clean instead.
        if format.is_line_oriented() && config.trim() == "delete" {
            let name = self.session_name()?;
            return self
                .run_cmds(&load_commands(&name, "", LoadMode::Replace), false)
                .map(|_| ());
        }
        let name = self.session_name()?;
        self.run_cmds(&load_commands(&name, config, mode), false)
            .map(|_| ())
    }

    fn commit_check(&mut self) -> Result<(), BackendError> {
        // Commands are validated as the session is loaded.
        Ok(())
    }

    fn diff(&mut self) -> Result<String, BackendError> {
        let name = self.session_name()?;
        let results = self.run_cmds(&[format!("show session-config named {name} diffs")], true)?;
        Ok(Self::text_output(&results))
    }

    fn discard(&mut self) -> Result<(), BackendError> {
        let name = self.session_name()?;
        self.run_cmds(&[format!("configure session {name}"), "abort".to_string()], false)?;
        self.session = None;
        Ok(())
    }

    fn commit_confirmed(&mut self, minutes: u32, _comment: &str) -> Result<(), BackendError> {
        let name = self.session_name()?;
        self.run_cmds(&[format!("configure session {name}"), commit_timer(minutes)], false)
            .map(|_| ())
    }

    fn confirm(&mut self) -> Result<(), BackendError> {
        let name = self.session_name()?;
        self.run_cmds(&[format!("configure session {name} commit")], false)?;
        self.session = None;
        Ok(())
    }
}
