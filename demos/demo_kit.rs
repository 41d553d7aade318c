//! A kit binary with a Junos template.
//!
//! Run from the repository root against the bundled data tree:
//!
//! ```text
//! cargo run --example demo_kit -- --settings demos/kit/nectl.toml hosts
//! cargo run --example demo_kit -- --settings demos/kit/nectl.toml render
//! ```
use std::collections::BTreeMap;

use anyhow::Result;
use nectl::commands::{self, Toolkit};
use nectl::datatree::Facts;
use nectl::templates::{Section, Template, TemplateRegistry};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct RoutedInterface {
    description: String,
    ip: String,
    #[serde(default = "enabled")]
    enabled: bool,
}

const fn enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct BgpNeighbor {
    ip: String,
    description: String,
    peer_as: u32,
}

fn system() -> Vec<Section> {
    vec![
        Section::new("version", |args, w| {
            w.line(format!("set version \"{}\"", args.str("os_version")?));
            Ok(())
        })
        .require("os_version"),
        Section::new("hostname", |args, w| {
            w.line(format!("set system host-name {}", args.str("id")?));
            Ok(())
        })
        .require("id"),
        Section::new("root_user", |args, w| {
            w.line(format!(
                "set system root-authentication encrypted-password \"{}\"",
                args.str("root_password")?
            ));
            Ok(())
        })
        .require("root_password"),
        Section::new("syslog", |_, w| {
            w.line("set system syslog user * any emergency");
            w.line("set system syslog file messages any any");
            w.line("set system syslog file messages authorization info");
            w.line("set system syslog file interactive-commands interactive-commands any");
            Ok(())
        }),
        Section::new("services", |_, w| {
            w.line("set system services ssh root-login deny");
            w.line("set system services netconf ssh");
            Ok(())
        }),
        Section::new("login_message", |args, w| {
            w.line(format!(
                "set system login announcement \"\\n\\n{}\\n\\n\"",
                args.str("login_message")?
            ));
            Ok(())
        })
        .optional("login_message", "Be careful when making changes."),
    ]
}

fn interfaces() -> Vec<Section> {
    vec![
        Section::new("mgmt_interface", |args, w| {
            let length: u8 = args.get("mgmt_netmask_length")?;
            w.line(format!(
                "set interfaces fxp0 unit 0 family inet address {}/{length}",
                args.str("mgmt_ip")?
            ));
            Ok(())
        })
        .require("mgmt_ip")
        .optional("mgmt_netmask_length", 24),
        Section::new("routed_interfaces", |args, w| {
            let interfaces: BTreeMap<String, RoutedInterface> = args.get("interfaces")?;
            for (name, iface) in interfaces {
                if !iface.enabled {
                    w.line(format!("set interfaces {name} disable"));
                }
                w.line(format!("set interfaces {name} description {}", iface.description));
                w.line(format!("set interfaces {name} unit 0 family inet address {}", iface.ip));
            }
            Ok(())
        })
        .optional("interfaces", json!({})),
    ]
}

fn snmp() -> Section {
    Section::new("snmp_public", |args, w| {
        w.line(format!(
            "set snmp community public authorization {}",
            args.str("snmp_public_auth")?
        ));
        let clients: Vec<String> = args.get("snmp_public_clients")?;
        for client in clients {
            w.line(format!("set snmp community public clients {client}"));
        }
        Ok(())
    })
    .require("snmp_public_auth")
    .require("snmp_public_clients")
}

fn bgp() -> Section {
    Section::new("bgp", |args, w| {
        let local_as: u32 = args.get("local_as")?;
        let neighbors: Vec<BgpNeighbor> = args.get("bgp_neighbors")?;
        w.line(format!("set routing-options autonomous-system {local_as}"));
        w.line("set protocols bgp group ebgp type external");
        for n in neighbors {
            w.line(format!(
                "set protocols bgp group ebgp neighbor {} description {} peer-as {}",
                n.ip, n.description, n.peer_as
            ));
        }
        Ok(())
    })
    .require("local_as")
    .optional("bgp_neighbors", Value::Array(Vec::new()))
}

fn junos(facts: &Facts) -> Template {
    let mut template = Template::new("junos");
    for section in system().into_iter().chain(interfaces()) {
        template = template.section(section);
    }
    template
        .section(snmp())
        .section_if(facts.contains("local_as"), bgp())
}

fn main() -> Result<()> {
    let toolkit = Toolkit {
        templates: TemplateRegistry::new().register("junos", |facts| Ok(junos(facts))),
        ..Toolkit::default()
    };
    commands::main(&toolkit)
}
