//! The data tree: hosts, their identity and the facts resolved for them.
//!
//! Facts are declared in TOML or JSON documents under the kit's data
//! directory. For each host, the configured lookup paths are expanded from
//! the host's identity and the matching sources are merged from general to
//! specific according to each declaration's [`Action`].

mod action;
mod discovery;
mod facts;
mod host;
mod lookup;
mod resolve;
mod source;

pub use action::Action;
pub use discovery::{HostFilter, discover_hosts};
pub use facts::Facts;
pub use host::Host;
pub use lookup::expand_lookup_path;
pub use resolve::{FactResolver, merge_values, resolve_all};
pub use source::{Declaration, FactSource, locate_sources};
