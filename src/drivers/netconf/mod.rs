//! Junos NETCONF backend.
//!
//! Speaks NETCONF 1.0 framing over an `ssh -s netconf` subprocess and uses
//! the Junos configuration RPCs (`load-configuration`, `commit-configuration`,
//! `get-configuration`) on the shared candidate database.

mod reply;
mod session;

use std::time::Duration;

use quick_xml::escape::escape;

use self::reply::{check, configuration_xml, element_text, joined};
use self::session::{Session, Transport};
use super::backend::{Backend, LoadMode};
use super::error::{BackendError, RpcError};
use super::format::{ConfigFormat, sanitize};
use super::registry::DriverTarget;

/// NETCONF session to a Junos device.
#[derive(Debug)]
pub struct NetconfBackend {
    target: DriverTarget,
    session: Option<Session>,
}

impl NetconfBackend {
    /// Backend for `target`; nothing is spawned until [`Backend::connect`].
    #[must_use]
    pub fn new(target: &DriverTarget) -> Self {
        Self {
            target: target.clone(),
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut Session, BackendError> {
        self.session
            .as_mut()
            .ok_or_else(|| BackendError::Protocol("no NETCONF session".to_string()))
    }

    fn rpc(&mut self, body: &str) -> Result<String, BackendError> {
        self.session()?.rpc(body)
    }

    fn rpc_ok(
        &mut self,
        body: &str,
        classify: fn(Vec<RpcError>) -> BackendError,
    ) -> Result<String, BackendError> {
        let reply = self.rpc(body)?;
        check(&reply, classify)?;
        Ok(reply)
    }
}

fn protocol_error(errors: Vec<RpcError>) -> BackendError {
    BackendError::Protocol(joined(&errors))
}

fn lock_error(errors: Vec<RpcError>) -> BackendError {
    BackendError::Lock(joined(&errors))
}

/// `<load-configuration>` body for a document.
fn load_rpc(config: &str, format: ConfigFormat, mode: LoadMode) -> String {
    let action = match (format, mode) {
        (ConfigFormat::Set, _) => "set",
        (_, LoadMode::Merge) => "merge",
        (_, LoadMode::Replace) => "update",
    };
    match format {
        ConfigFormat::Set => format!(
            r#"<load-configuration action="{action}" format="text"><configuration-set>{}</configuration-set></load-configuration>"#,
            escape(config)
        ),
        ConfigFormat::Text => format!(
            r#"<load-configuration action="{action}" format="text"><configuration-text>{}</configuration-text></load-configuration>"#,
            escape(config)
        ),
        ConfigFormat::Json => format!(
            r#"<load-configuration action="{action}" format="json"><configuration-json>{}</configuration-json></load-configuration>"#,
            escape(config)
        ),
        ConfigFormat::Xml => format!(
            r#"<load-configuration action="{action}" format="xml">{}</load-configuration>"#,
            config.trim()
        ),
    }
}

fn commit_confirmed_rpc(minutes: u32, comment: &str) -> String {
    format!(
        "<commit-configuration><confirmed/><confirm-timeout>{minutes}</confirm-timeout><log>{}</log></commit-configuration>",
        escape(comment)
    )
}

const COMMIT_CHECK_RPC: &str = "<commit-configuration><check/></commit-configuration>";

impl Backend for NetconfBackend {
    fn connect(&mut self) -> Result<(), BackendError> {
        let transport = Transport::for_target(&self.target)?;
        let session = Session::open(
            &transport,
            self.target.connect_timeout,
            self.target.rpc_timeout.max(Duration::from_secs(1)),
        )?;
        self.session = Some(session);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BackendError> {
        match self.session.take() {
            Some(session) => session.close(),
            None => Ok(()),
        }
    }

    fn default_format(&self) -> ConfigFormat {
        ConfigFormat::Text
    }

    fn running_config(
        &mut self,
        format: ConfigFormat,
        sanitized: bool,
    ) -> Result<String, BackendError> {
        let reply = self.rpc_ok(
            &format!(r#"<get-configuration format="{format}"/>"#),
            protocol_error,
        )?;
        let config = match format {
            ConfigFormat::Text => element_text(&reply, &["configuration-text"])?,
            ConfigFormat::Set => element_text(&reply, &["configuration-set"])?,
            ConfigFormat::Json => element_text(&reply, &["configuration-json"])?,
            ConfigFormat::Xml => configuration_xml(&reply).map(str::to_string),
        }
        .ok_or_else(|| BackendError::Protocol("reply carries no configuration".to_string()))?;
        let config = config.trim().to_string();
        Ok(if sanitized { sanitize(&config) } else { config })
    }

    fn lock(&mut self) -> Result<(), BackendError> {
        self.rpc_ok("<lock><target><candidate/></target></lock>", lock_error)
            .map(|_| ())
    }

    fn unlock(&mut self) -> Result<(), BackendError> {
        self.rpc_ok("<unlock><target><candidate/></target></unlock>", lock_error)
            .map(|_| ())
    }

    fn load(
        &mut self,
        config: &str,
        format: ConfigFormat,
        mode: LoadMode,
    ) -> Result<(), BackendError> {
        self.rpc_ok(&load_rpc(config, format, mode), BackendError::Rejected)
            .map(|_| ())
    }

    fn commit_check(&mut self) -> Result<(), BackendError> {
        self.rpc_ok(COMMIT_CHECK_RPC, BackendError::Rejected).map(|_| ())
    }

    fn diff(&mut self) -> Result<String, BackendError> {
        let reply = self.rpc_ok(
            r#"<get-configuration compare="rollback" rollback="0" format="text"/>"#,
            protocol_error,
        )?;
        Ok(element_text(&reply, &["configuration-output"])?.unwrap_or_default())
    }

    fn discard(&mut self) -> Result<(), BackendError> {
        self.rpc_ok("<discard-changes/>", protocol_error).map(|_| ())
    }

    fn commit_confirmed(&mut self, minutes: u32, comment: &str) -> Result<(), BackendError> {
        self.rpc_ok(&commit_confirmed_rpc(minutes, comment), BackendError::Rejected)
            .map(|_| ())
    }

    fn confirm(&mut self) -> Result<(), BackendError> {
        // A commit check on the new session confirms the pending commit.
        self.rpc_ok(COMMIT_CHECK_RPC, BackendError::Rejected).map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn set_statements_are_escaped_in_configuration_set() {
        let body = load_rpc(
            "set interfaces ge-0/0/0 description \"a<b\"",
            ConfigFormat::Set,
            LoadMode::Merge,
        );
        assert_eq!(
            body,
            r#"<load-configuration action="set" format="text"><configuration-set>set interfaces ge-0/0/0 description &quot;a&lt;b&quot;</configuration-set></load-configuration>"#
        );
    }

    #[test]
    fn text_replace_uses_update() {
        let body = load_rpc("system { }", ConfigFormat::Text, LoadMode::Replace);
        assert!(body.starts_with(r#"<load-configuration action="update" format="text">"#));
        assert!(body.contains("<configuration-text>system { }</configuration-text>"));
    }

    #[test]
    fn xml_is_embedded_verbatim() {
        let body = load_rpc("<configuration><system/></configuration>\n", ConfigFormat::Xml, LoadMode::Replace);
        assert!(body.contains(r#"format="xml"><configuration><system/></configuration></load-configuration>"#));
    }

    #[test]
    fn commit_confirmed_carries_timer_and_comment() {
        assert_eq!(
            commit_confirmed_rpc(2, "Configured by Nectl."),
            "<commit-configuration><confirmed/><confirm-timeout>2</confirm-timeout><log>Configured by Nectl.</log></commit-configuration>"
        );
    }

    #[test]
    fn rpc_without_session_is_protocol_error() {
        let target = DriverTarget::new("core0.lon", "junos", IpAddr::V4(Ipv4Addr::LOCALHOST));
        let mut backend = NetconfBackend::new(&target);
        assert!(matches!(backend.lock(), Err(BackendError::Protocol(_))));
        assert!(backend.disconnect().is_ok());
    }
}
