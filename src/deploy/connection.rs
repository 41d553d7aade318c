//! Scoped driver connections.
use crate::drivers::{Driver, DriverError};
use crate::logging::Log;

/// An open driver that is closed when dropped.
///
/// Close failures are logged as warnings and never propagated, so an error
/// from the operation itself is what the caller sees.
pub(super) struct ScopedConnection<'a> {
    driver: Option<Box<dyn Driver>>,
    log: &'a dyn Log,
}

impl<'a> ScopedConnection<'a> {
    /// Open `driver` and take ownership of its connection.
    pub(super) fn open(mut driver: Box<dyn Driver>, log: &'a dyn Log) -> Result<Self, DriverError> {
        driver.open(log)?;
        log.info(&format!("[{}] opened connection to host", driver.host_id()));
        Ok(Self::adopt(driver, log))
    }

    /// Guard a driver whose connection is already open.
    pub(super) fn adopt(driver: Box<dyn Driver>, log: &'a dyn Log) -> Self {
        Self {
            driver: Some(driver),
            log,
        }
    }

    /// The guarded driver.
    pub(super) fn driver(&mut self) -> Result<&mut dyn Driver, DriverError> {
        match self.driver.as_deref_mut() {
            Some(driver) => Ok(driver),
            None => Err(DriverError::NotConnected {
                method: "scoped connection",
            }),
        }
    }

    /// Release the driver without closing it.
    pub(super) fn detach(mut self) -> Option<Box<dyn Driver>> {
        self.driver.take()
    }
}

impl Drop for ScopedConnection<'_> {
    fn drop(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };
        match driver.close(self.log) {
            Ok(()) => self
                .log
                .info(&format!("[{}] closed connection to host", driver.host_id())),
            Err(e) => self.log.warn(&format!(
                "[{}] failed to close connection: {e}",
                driver.host_id()
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::deploy::testing::{Script, ScriptedDriver};
    use crate::logging::isolated_logger;

    #[test]
    fn drop_closes_driver() {
        let (log, _tmp, _guard) = isolated_logger();
        let (driver, recorder) = ScriptedDriver::new("core0.lon", Script::default());
        {
            let mut conn = ScopedConnection::open(Box::new(driver), &log).unwrap();
            assert!(conn.driver().unwrap().is_connected());
        }
        assert!(recorder.closed());
    }

    #[test]
    fn close_failure_is_swallowed() {
        let (log, _tmp, _guard) = isolated_logger();
        let script = Script {
            fail_close: true,
            ..Script::default()
        };
        let (driver, recorder) = ScriptedDriver::new("core0.lon", script);
        drop(ScopedConnection::open(Box::new(driver), &log).unwrap());
        assert!(recorder.close_attempted());
    }

    #[test]
    fn detach_keeps_connection_open() {
        let (log, _tmp, _guard) = isolated_logger();
        let (driver, recorder) = ScriptedDriver::new("core0.lon", Script::default());
        let conn = ScopedConnection::open(Box::new(driver), &log).unwrap();
        let driver = conn.detach().unwrap();
        assert!(driver.is_connected());
        assert!(!recorder.closed());
    }

    #[test]
    fn open_failure_returns_error() {
        let (log, _tmp, _guard) = isolated_logger();
        let script = Script {
            fail_open: true,
            ..Script::default()
        };
        let (driver, recorder) = ScriptedDriver::new("core0.lon", script);
        assert!(ScopedConnection::open(Box::new(driver), &log).is_err());
        assert!(!recorder.close_attempted());
    }
}
