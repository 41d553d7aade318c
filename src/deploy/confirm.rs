//! Deferred confirmation of committed configs.
//!
//! A host whose apply committed is parked here with its open driver until
//! the settle period has passed. The scheduler thread only keeps time: each
//! commit that falls due is confirmed on its own thread, so a slow or hung
//! confirm never delays another host past its rollback timer. Parked
//! commits are always confirmed, even after cancellation: the device's
//! rollback timer is the only other way out.
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;

use super::connection::ScopedConnection;
use crate::drivers::{CONNECTION_LOST_AFTER_COMMIT, Driver, DriverError, PendingCommit};
use crate::logging::{BufferedLog, Log, Logger};

/// Result of confirming one host.
pub(super) type Confirmed = (String, Result<String, DriverError>);

/// A committed host waiting to be confirmed.
pub(super) struct Parked {
    pub host_id: String,
    pub driver: Box<dyn Driver>,
    pub pending: PendingCommit,
    pub due: Instant,
}

impl Parked {
    pub(super) fn new(driver: Box<dyn Driver>, pending: PendingCommit) -> Self {
        Self {
            host_id: driver.host_id().to_string(),
            due: Instant::now() + pending.settle,
            driver,
            pending,
        }
    }
}

/// Failure recorded for a commit whose confirmation never reported back.
pub(super) fn unconfirmed(diff: String, why: &str) -> DriverError {
    DriverError::CommitDisconnect {
        reason: format!("{CONNECTION_LOST_AFTER_COMMIT}: {why}"),
        diff,
    }
}

/// Confirm `parked` now and close its connection.
pub(super) fn confirm(parked: Parked, log: &Arc<Logger>) -> Confirmed {
    let buf = BufferedLog::new(Arc::clone(log));
    let result = {
        let mut conn = ScopedConnection::adopt(parked.driver, &buf);
        conn.driver()
            .and_then(|driver| driver.confirm_commit(&parked.pending, &buf))
    };
    buf.flush();
    (parked.host_id, result)
}

struct InFlight<'scope> {
    host_id: String,
    diff: String,
    handle: ScopedJoinHandle<'scope, Confirmed>,
}

impl InFlight<'_> {
    fn join(self, log: &Logger) -> Confirmed {
        self.handle.join().unwrap_or_else(|_| {
            log.error(&format!("[{}] confirmation panicked", self.host_id));
            let error = unconfirmed(self.diff, "confirmation panicked");
            (self.host_id, Err(error))
        })
    }
}

/// Confirm parked commits as they fall due until the sending side closes
/// and nothing is left waiting. Results come back in the order the
/// confirmations were started.
pub(super) fn run_scheduler(incoming: &Receiver<Parked>, log: &Arc<Logger>) -> Vec<Confirmed> {
    thread::scope(|s| {
        let mut waiting: Vec<Parked> = Vec::new();
        let mut in_flight = Vec::new();
        let mut open = true;

        loop {
            let now = Instant::now();
            let (due, later): (Vec<_>, Vec<_>) = waiting.into_iter().partition(|p| p.due <= now);
            waiting = later;
            for parked in due {
                in_flight.push(InFlight {
                    host_id: parked.host_id.clone(),
                    diff: parked.pending.diff.clone(),
                    handle: s.spawn(move || confirm(parked, log)),
                });
            }

            let next_due = waiting.iter().map(|p| p.due).min();
            match (open, next_due) {
                (false, None) => break,
                (false, Some(due)) => thread::sleep(due.saturating_duration_since(Instant::now())),
                (true, Some(due)) => {
                    match incoming.recv_timeout(due.saturating_duration_since(Instant::now())) {
                        Ok(parked) => waiting.push(parked),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => open = false,
                    }
                }
                (true, None) => match incoming.recv() {
                    Ok(parked) => waiting.push(parked),
                    Err(_) => open = false,
                },
            }
        }

        in_flight.into_iter().map(|f| f.join(log)).collect()
    })
}
