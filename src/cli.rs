//! Command-line interface definition.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::datatree::HostFilter;
use crate::deploy::Credentials;
use crate::drivers::ConfigFormat;

/// Top-level CLI entry point.
#[derive(Parser, Debug)]
#[command(
    name = "nectl",
    about = "Network configuration data tree, renderer and deployment engine",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Increase console verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Kit settings file (default: $NECTL_SETTINGS, then ./nectl.toml)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// Number of hosts processed concurrently (default: from settings)
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,
}

/// Host selection shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterOpts {
    /// Only hosts with this hostname
    #[arg(long)]
    pub hostname: Option<String>,

    /// Only hosts of this customer
    #[arg(short, long)]
    pub customer: Option<String>,

    /// Only hosts at this site
    #[arg(long)]
    pub site: Option<String>,

    /// Only hosts with this role
    #[arg(short, long)]
    pub role: Option<String>,

    /// Only hosts in this deployment group
    #[arg(short, long)]
    pub deployment_group: Option<String>,
}

impl FilterOpts {
    /// The host filter these options describe.
    #[must_use]
    pub fn to_filter(&self) -> HostFilter {
        HostFilter {
            hostname: self.hostname.clone(),
            customer: self.customer.clone(),
            site: self.site.clone(),
            role: self.role.clone(),
            deployment_group: self.deployment_group.clone(),
        }
    }
}

/// Login overrides for commands that talk to devices.
#[derive(Args, Debug, Clone, Default)]
pub struct CredentialOpts {
    /// Username for every host
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password for every host
    #[arg(short, long)]
    pub password: Option<String>,

    /// SSH private key file for every host
    #[arg(short = 'k', long)]
    pub ssh_key: Option<PathBuf>,
}

impl CredentialOpts {
    /// The batch credentials these options describe.
    #[must_use]
    pub fn to_credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            ssh_key: self.ssh_key.clone(),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List hosts discovered in the data tree
    Hosts(FilterOpts),
    /// Print the resolved facts of hosts as JSON
    Facts(FilterOpts),
    /// Render configs into the staged configs directory
    Render(FilterOpts),
    /// Compare staged configs with the running configs on hosts
    Diff(DeployOpts),
    /// Apply staged configs to hosts with commit-confirm
    Apply(ApplyOpts),
    /// Fetch running configs from hosts into the active configs directory
    Get(GetOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hosts(_) => "hosts",
            Self::Facts(_) => "facts",
            Self::Render(_) => "render",
            Self::Diff(_) => "diff",
            Self::Apply(_) => "apply",
            Self::Get(_) => "get",
            Self::Version => "version",
        }
    }
}

/// Options for commands that run on devices.
#[derive(Args, Debug, Clone, Default)]
pub struct DeployOpts {
    /// Host selection.
    #[command(flatten)]
    pub filter: FilterOpts,

    /// Login overrides.
    #[command(flatten)]
    pub credentials: CredentialOpts,
}

/// Options for the `apply` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ApplyOpts {
    /// Host selection and login overrides.
    #[command(flatten)]
    pub deploy: DeployOpts,

    /// Minutes before an unconfirmed commit is rolled back (default: from settings)
    #[arg(long)]
    pub rollback_minutes: Option<u32>,
}

/// Options for the `get` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GetOpts {
    /// Host selection and login overrides.
    #[command(flatten)]
    pub deploy: DeployOpts,

    /// Config format: set, text, xml or json (default: from settings)
    #[arg(short, long)]
    pub format: Option<ConfigFormat>,

    /// Keep secrets in the fetched configs
    #[arg(long)]
    pub unsanitized: bool,
}
