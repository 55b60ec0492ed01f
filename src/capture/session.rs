use anyhow::{anyhow, Context, Result};

use super::driver::{CameraDriver, CaptureCallbacks};
use crate::config::CaptureConfig;

/// Session lifecycle states. `Closed` is terminal; a closed session cannot
/// capture again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Configured,
    Capturing,
    Closed,
}

/// Live handle to an opened camera.
pub struct CameraSession {
    driver: Box<dyn CameraDriver>,
    config: CaptureConfig,
    state: SessionState,
}

impl CameraSession {
    /// Open the camera and apply `config`.
    ///
    /// A configuration the device rejects aborts the open; no half-open
    /// session is left behind.
    pub fn open(mut driver: Box<dyn CameraDriver>, config: CaptureConfig) -> Result<Self> {
        driver
            .configure(&config)
            .context("configure camera device")?;
        Ok(Self {
            driver,
            config,
            state: SessionState::Configured,
        })
    }

    /// Begin buffer production. Valid once, from the configured state.
    pub fn start(&mut self, callbacks: CaptureCallbacks) -> Result<()> {
        match self.state {
            SessionState::Configured => {}
            state => return Err(anyhow!("cannot start capture from {state:?}")),
        }
        self.driver.start(callbacks).context("start capture")?;
        self.state = SessionState::Capturing;
        Ok(())
    }

    /// Stop capture and release the device.
    ///
    /// Safe to call in any state, including before `start` and repeatedly.
    /// When this returns, no further callback will fire: the driver joins
    /// its capture context before reporting the stop.
    pub fn stop_and_close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let result = self.driver.stop().context("close camera device");
        self.state = SessionState::Closed;
        result
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if let Err(err) = self.stop_and_close() {
            log::warn!("camera session teardown failed: {err:#}");
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CallLog(Arc<Mutex<Vec<&'static str>>>);

    impl CallLog {
        fn push(&self, call: &'static str) {
            self.0.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    struct MockDriver {
        log: CallLog,
        fail_configure: bool,
    }

    impl CameraDriver for MockDriver {
        fn configure(&mut self, _config: &CaptureConfig) -> Result<()> {
            self.log.push("configure");
            if self.fail_configure {
                return Err(anyhow!("device busy"));
            }
            Ok(())
        }

        fn start(&mut self, _callbacks: CaptureCallbacks) -> Result<()> {
            self.log.push("start");
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.log.push("stop");
            Ok(())
        }
    }

    fn mock(log: &CallLog) -> Box<dyn CameraDriver> {
        Box::new(MockDriver {
            log: log.clone(),
            fail_configure: false,
        })
    }

    #[test]
    fn open_applies_configuration() {
        let log = CallLog::default();
        let session = CameraSession::open(mock(&log), CaptureConfig::default()).unwrap();
        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(log.calls(), vec!["configure"]);
    }

    #[test]
    fn rejected_configuration_aborts_open() {
        let log = CallLog::default();
        let driver = Box::new(MockDriver {
            log: log.clone(),
            fail_configure: true,
        });
        assert!(CameraSession::open(driver, CaptureConfig::default()).is_err());
    }

    #[test]
    fn start_moves_to_capturing_once() {
        let log = CallLog::default();
        let mut session = CameraSession::open(mock(&log), CaptureConfig::default()).unwrap();
        session.start(CaptureCallbacks::default()).unwrap();
        assert_eq!(session.state(), SessionState::Capturing);
        assert!(session.start(CaptureCallbacks::default()).is_err());
    }

    #[test]
    fn stop_before_start_is_safe_and_terminal() {
        let log = CallLog::default();
        let mut session = CameraSession::open(mock(&log), CaptureConfig::default()).unwrap();
        session.stop_and_close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        // Closed is terminal: capture cannot restart.
        assert!(session.start(CaptureCallbacks::default()).is_err());
        // Repeated close is a no-op.
        session.stop_and_close().unwrap();
        assert_eq!(log.calls(), vec!["configure", "stop"]);
    }

    #[test]
    fn drop_stops_a_capturing_session() {
        let log = CallLog::default();
        {
            let mut session = CameraSession::open(mock(&log), CaptureConfig::default()).unwrap();
            session.start(CaptureCallbacks::default()).unwrap();
        }
        assert_eq!(log.calls(), vec!["configure", "start", "stop"]);
    }
}
