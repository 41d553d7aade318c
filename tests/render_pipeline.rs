#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the rendering pipeline.
//!
//! Hosts are discovered from an on-disk kit, resolved and rendered through
//! [`render_hosts`], and through the `render` command which writes the
//! staged configs.

mod common;

use std::sync::Arc;

use clap::Parser as _;
use common::{TestKit, TestKitBuilder, junos_host};
use nectl::cancel::CancelToken;
use nectl::cli::Cli;
use nectl::commands::{self, Toolkit};
use nectl::datatree::FactResolver;
use nectl::error::RenderError;
use nectl::logging::{HostStatus, Logger};
use nectl::templates::{Section, Template, TemplateRegistry, render_hosts};

fn junos_template(facts: &nectl::datatree::Facts) -> Template {
    Template::new("junos")
        .section(
            Section::new("hostname", |args, w| {
                w.line(format!("set system host-name {}", args.str("id")?));
                Ok(())
            })
            .require("id"),
        )
        .section(
            Section::new("ntp", |args, w| {
                let servers: Vec<String> = args.get("ntp_servers")?;
                for server in servers {
                    w.line(format!("set system ntp server {server}"));
                }
                Ok(())
            })
            .optional("ntp_servers", serde_json::json!([])),
        )
        .section(
            Section::new("login", |args, w| {
                w.line(format!(
                    "set system login message \"{}\"",
                    args.str("login_message")?
                ));
                Ok(())
            })
            .optional("login_message", "Authorised access only"),
        )
        .section_if(
            facts.contains("snmp_community"),
            Section::new("snmp", |args, w| {
                w.line(format!(
                    "set snmp community {} authorization read-only",
                    args.str("snmp_community")?
                ));
                Ok(())
            })
            .require("snmp_community"),
        )
        .section_if(
            facts.get_str("role") == Some("edge"),
            Section::new("bgp", |args, w| {
                let asn: u32 = args.get("local_as")?;
                w.line(format!("set routing-options autonomous-system {asn}"));
                Ok(())
            })
            .require("local_as"),
        )
}

fn templates() -> TemplateRegistry {
    TemplateRegistry::new().register("junos", |facts| Ok(junos_template(facts)))
}

fn kit() -> TestKit {
    TestKitBuilder::new()
        .data("common.toml", "ntp_servers = [\"192.0.2.123\"]\n")
        .data(
            "sites/lon/common.toml",
            "ntp_servers = [\"198.51.100.1\"]\nsnmp_community = \"lon-ro\"\n\n[_actions]\nntp_servers = \"merge\"\n",
        )
        .host("lon", "core0", &junos_host("core", "192.0.2.1"))
        .host("par", "core0", &junos_host("core", "192.0.2.2"))
        .host("par", "edge0", &junos_host("edge", "192.0.2.3"))
        .host("par", "console0", "role = \"console\"\n")
        .build()
}

// ---------------------------------------------------------------------------
// render_hosts
// ---------------------------------------------------------------------------

/// Snapshot of a fully rendered config: sections in declared order, one
/// blank line between them, conditional sections at the end.
#[test]
fn rendered_config_snapshot() {
    let kit = kit();
    let settings = kit.settings();
    let log = Arc::new(Logger::new("test"));
    let hosts = kit.host_list();

    let report = render_hosts(
        &hosts,
        &FactResolver::from_settings(&settings),
        &templates(),
        settings.jobs,
        &log,
    )
    .unwrap();
    insta::assert_snapshot!("core0_lon_config", report.configs["core0.lon"]);
}

/// A section failure on one host discards only that host's config.
#[test]
fn failures_are_isolated_per_host() {
    let kit = kit();
    let settings = kit.settings();
    let log = Arc::new(Logger::new("test"));
    let hosts = kit.host_list();

    let report = render_hosts(
        &hosts,
        &FactResolver::from_settings(&settings),
        &templates(),
        settings.jobs,
        &log,
    )
    .unwrap();

    let rendered: Vec<&str> = report.configs.keys().map(String::as_str).collect();
    assert_eq!(rendered, ["core0.lon", "core0.par"]);
    assert_eq!(report.error_count(), 1);
    let edge = &report.failures["edge0.par"];
    assert!(matches!(
        edge,
        RenderError::SectionsFailed { failures, .. } if failures.len() == 1 && failures[0].section == "bgp"
    ));
    assert_eq!(edge.missing_facts(), ["local_as"]);
    assert!(edge.to_string().contains("section 'bgp' needs fact: local_as"));
    assert_eq!(report.skipped, ["console0.par"]);
    assert!(!report.configs["core0.par"].contains("snmp"));
    assert_eq!(log.failure_count(), 1);
    assert!(
        log.host_entries()
            .iter()
            .any(|e| e.host == "console0.par" && e.status == HostStatus::Skipped)
    );
}

/// A host whose OS has no template fails without touching the others.
#[test]
fn missing_template_fails_only_that_host() {
    let kit = TestKitBuilder::new()
        .host("lon", "core0", &junos_host("core", "192.0.2.1"))
        .host(
            "lon",
            "fw0",
            "os_name = \"panos\"\nos_version = \"10.1\"\nrole = \"firewall\"\n",
        )
        .build();
    let settings = kit.settings();
    let log = Arc::new(Logger::new("test"));

    let report = render_hosts(
        &kit.host_list(),
        &FactResolver::from_settings(&settings),
        &templates(),
        settings.jobs,
        &log,
    )
    .unwrap();
    assert!(report.configs.contains_key("core0.lon"));
    assert!(matches!(
        report.failures["fw0.lon"],
        RenderError::TemplateMissing { ref os_name } if os_name == "panos"
    ));
}

// ---------------------------------------------------------------------------
// render command
// ---------------------------------------------------------------------------

fn render_command(kit: &TestKit, extra: &[&str]) -> anyhow::Result<()> {
    let settings = kit.settings_path();
    let mut args = vec!["nectl", "render", "--settings", settings.to_str().unwrap()];
    args.extend_from_slice(extra);
    let toolkit = Toolkit {
        templates: templates(),
        ..Toolkit::default()
    };
    let log = Arc::new(Logger::new("render"));
    commands::dispatch(Cli::parse_from(args), &toolkit, &log, &CancelToken::new())
}

/// The command stages every successful host and fails with the error count.
#[test]
fn render_command_stages_configs_and_reports_failures() {
    let kit = kit();
    let staged = kit.root_path().join("configs/staged");
    std::fs::create_dir_all(&staged).unwrap();
    std::fs::write(staged.join("gone.lon.txt"), "stale").unwrap();

    let err = render_command(&kit, &[]).unwrap_err();
    assert_eq!(err.to_string(), "1 hosts failed to render (2 configs written)");

    let mut files: Vec<String> = std::fs::read_dir(&staged)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, ["core0.lon.txt", "core0.par.txt"]);
    let core = std::fs::read_to_string(staged.join("core0.par.txt")).unwrap();
    assert!(core.starts_with("set system host-name core0.par\n"));
    assert!(core.ends_with("\"Authorised access only\"\n"));
}

/// Filters narrow the command to the selected hosts.
#[test]
fn render_command_honours_filters() {
    let kit = kit();
    render_command(&kit, &["--site", "lon"]).unwrap();
    let staged = kit.root_path().join("configs/staged");
    assert!(staged.join("core0.lon.txt").is_file());
    assert!(!staged.join("core0.par.txt").exists());
}
