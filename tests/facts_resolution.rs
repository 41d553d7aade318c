#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing,
    clippy::panic
)]
//! Integration tests for host discovery and fact resolution.
//!
//! Each test lays out a kit on disk and drives discovery and resolution
//! through the public API, the way the `hosts` and `facts` commands do.

mod common;

use common::{TestKitBuilder, junos_host};
use nectl::datatree::{FactResolver, HostFilter, resolve_all};
use nectl::error::{FactsError, NectlError};
use nectl::logging::Logger;
use serde_json::json;

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Identity comes from the host source's location, attributes from its body.
#[test]
fn discovery_reads_identity_from_path() {
    let kit = TestKitBuilder::new()
        .host("lon", "core0", &junos_host("core", "192.0.2.1"))
        .host("par", "edge0", "role = \"edge\"\n")
        .data("sites/par/hosts/_draft.toml", "role = \"edge\"\n")
        .build();

    let hosts = kit.hosts();
    let ids: Vec<&str> = hosts.keys().map(String::as_str).collect();
    assert_eq!(ids, ["core0.lon", "edge0.par"]);

    let core = &hosts["core0.lon"];
    assert_eq!(core.hostname, "core0");
    assert_eq!(core.site.as_deref(), Some("lon"));
    assert_eq!(core.os_name.as_deref(), Some("junos"));
    assert_eq!(core.mgmt_ip.map(|ip| ip.to_string()).as_deref(), Some("192.0.2.1"));
    assert!(hosts["edge0.par"].mgmt_ip.is_none());
}

/// Filters compare declared attributes and unset fields match everything.
#[test]
fn filter_selects_by_site_and_role() {
    let kit = TestKitBuilder::new()
        .host("lon", "core0", &junos_host("core", "192.0.2.1"))
        .host("lon", "edge0", &junos_host("edge", "192.0.2.2"))
        .host("par", "core0", &junos_host("core", "192.0.2.3"))
        .build();
    let hosts = kit.hosts();

    let filter = HostFilter {
        site: Some("lon".to_string()),
        role: Some("core".to_string()),
        ..HostFilter::default()
    };
    let selected: Vec<String> = filter.apply(&hosts).iter().map(|h| h.id()).collect();
    assert_eq!(selected, ["core0.lon"]);
    assert_eq!(HostFilter::default().apply(&hosts).len(), 3);
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Later lookup paths override earlier ones and merge actions combine lists
/// and tables with the specific values first.
#[test]
fn facts_merge_along_lookup_paths() {
    let kit = TestKitBuilder::new()
        .data(
            "common.toml",
            "ntp_servers = [\"ntp.global\"]\nbanner = \"global\"\n\n[snmp]\nlocation = \"earth\"\ncontact = \"noc\"\n",
        )
        .data("roles/core.toml", "banner = \"core\"\n")
        .data(
            "sites/lon/common.toml",
            "ntp_servers = [\"ntp.lon\"]\n\n[snmp]\nlocation = \"london\"\n\n[_actions]\nntp_servers = \"merge\"\nsnmp = \"merge\"\n",
        )
        .host("lon", "core0", &junos_host("core", "192.0.2.1"))
        .build();
    let settings = kit.settings();
    let resolver = FactResolver::from_settings(&settings);
    let log = Logger::new("test");
    let hosts = kit.host_list();

    resolve_all(&hosts, &resolver, settings.jobs, &log).unwrap();
    let facts = hosts[0].resolved_facts().expect("facts resolved");

    assert_eq!(facts.get("banner"), Some(&json!("core")));
    assert_eq!(facts.get("ntp_servers"), Some(&json!(["ntp.lon", "ntp.global"])));
    assert_eq!(
        facts.get("snmp"),
        Some(&json!({"location": "london", "contact": "noc"}))
    );
    assert_eq!(facts.get_str("id"), Some("core0.lon"));
    assert_eq!(facts.get_str("os_name"), Some("junos"));
}

/// A frozen fact ignores every later declaration, including the host's own.
#[test]
fn frozen_fact_survives_host_override() {
    let kit = TestKitBuilder::new()
        .data(
            "sites/lon/common.toml",
            "login_message = \"site\"\n\n[_actions]\nlogin_message = \"frozen\"\n",
        )
        .host(
            "lon",
            "core0",
            &format!("{}login_message = \"host\"\n", junos_host("core", "192.0.2.1")),
        )
        .build();
    let settings = kit.settings();
    let resolver = FactResolver::from_settings(&settings);
    let log = Logger::new("test");
    let hosts = kit.host_list();

    let facts = hosts[0].facts(&resolver, &log).unwrap();
    assert_eq!(facts.get_str("login_message"), Some("site"));
}

/// The data tree cannot rename a host.
#[test]
fn identity_is_frozen() {
    let kit = TestKitBuilder::new()
        .data("common.toml", "hostname = \"renamed\"\nid = \"renamed\"\n")
        .host("lon", "core0", &junos_host("core", "192.0.2.1"))
        .build();
    let settings = kit.settings();
    let resolver = FactResolver::from_settings(&settings);
    let log = Logger::new("test");
    let hosts = kit.host_list();

    let facts = hosts[0].facts(&resolver, &log).unwrap();
    assert_eq!(facts.get_str("hostname"), Some("core0"));
    assert_eq!(facts.get_str("id"), Some("core0.lon"));
}

/// Facts are resolved once and the same cached value is returned after.
#[test]
fn facts_are_cached_per_host() {
    let kit = TestKitBuilder::new()
        .data("common.toml", "banner = \"first\"\n")
        .host("lon", "core0", &junos_host("core", "192.0.2.1"))
        .build();
    let settings = kit.settings();
    let resolver = FactResolver::from_settings(&settings);
    let log = Logger::new("test");
    let hosts = kit.host_list();

    let first = hosts[0].facts(&resolver, &log).unwrap();
    std::fs::write(kit.root_path().join("data/common.toml"), "banner = \"second\"\n").unwrap();
    let second = hosts[0].facts(&resolver, &log).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(second.get_str("banner"), Some("first"));
}

/// A lookup path needing an attribute the host lacks aborts resolution.
#[test]
fn unresolved_placeholder_aborts_the_run() {
    let kit = TestKitBuilder::new()
        .host("lon", "core0", &junos_host("core", "192.0.2.1"))
        .host("lon", "oob0", "os_name = \"junos\"\n")
        .build();
    let settings = kit.settings();
    let resolver = FactResolver::from_settings(&settings);
    let log = Logger::new("test");

    let err = resolve_all(&kit.host_list(), &resolver, settings.jobs, &log).unwrap_err();
    match err {
        NectlError::Facts(FactsError::UnresolvedPlaceholder {
            host, placeholder, ..
        }) => {
            assert_eq!(host, "oob0.lon");
            assert_eq!(placeholder, "role");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// A malformed source is reported with its path.
#[test]
fn malformed_source_is_reported() {
    let kit = TestKitBuilder::new()
        .data("common.toml", "this is = = not toml\n")
        .host("lon", "core0", &junos_host("core", "192.0.2.1"))
        .build();
    let settings = kit.settings();
    let resolver = FactResolver::from_settings(&settings);
    let log = Logger::new("test");
    let hosts = kit.host_list();

    let err = hosts[0].facts(&resolver, &log).unwrap_err();
    assert!(matches!(err, FactsError::MalformedSource { ref path, .. } if path.ends_with("common.toml")));
}
