//! Device drivers: fetch, diff and apply configuration on network hosts.
//!
//! A [`Driver`] owns one host's connection and exposes the three deployment
//! methods. The commit-confirm protocol lives once in [`NetworkDriver`]; the
//! device specifics sit behind the [`Backend`] trait, implemented for Junos
//! over NETCONF ([`NetconfBackend`]) and Arista EOS over eAPI
//! ([`EapiBackend`]). [`DriverRegistry`] picks a driver from a host's OS name.

mod backend;
mod driver;
mod eapi;
mod error;
mod format;
mod netconf;
mod registry;

pub use backend::{Backend, LoadMode};
pub use driver::{ApplyProgress, Driver, NetworkDriver, PendingCommit, StagedConfig, settle_duration};
pub use eapi::EapiBackend;
pub use error::{BackendError, CONNECTION_LOST_AFTER_COMMIT, DriverError, LOCK_FAILED, RpcError};
pub use format::{ConfigFormat, sanitize};
pub use netconf::NetconfBackend;
pub use registry::{DriverFactory, DriverRegistry, DriverTarget, EAPI, NETCONF};
