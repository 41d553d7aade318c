//! Batch deployment: run a driver method across many hosts.
//!
//! Hosts are processed on a bounded worker pool, each with its own driver,
//! connection and buffered log. A failure on one host is recorded and
//! counted but never stops the others. Applies that committed are handed to
//! a confirm scheduler that waits out the settle period off the pool.

mod batch;
mod confirm;
mod connection;
#[cfg(test)]
mod testing;

pub use batch::{Batch, BatchOutcome, Credentials, DeployOptions, Method};
