//! Bridge assembly: the construction and teardown entry points.
//!
//! Any host runtime able to instantiate [`CameraBridge`] and later call
//! [`CameraBridge::shutdown`] (or drop it) can drive the whole capture and
//! publication pipeline.

use anyhow::Result;

use crate::calibration::{CalibrationInfo, CalibrationStore, SensorGeometry};
use crate::capture::{CameraDriver, CameraSession};
use crate::config::BridgeConfig;
use crate::dispatch::FrameDispatcher;
use crate::sink::PublisherSet;

/// A running capture-and-publish bridge.
///
/// Construction opens and starts the capture session; any failure aborts
/// construction with nothing left half-open.
pub struct CameraBridge {
    session: CameraSession,
    calibration: CalibrationStore,
}

impl CameraBridge {
    /// Open `driver`, derive the initial calibration record from the capture
    /// resolution, and start publishing to `publishers`.
    pub fn new(
        driver: Box<dyn CameraDriver>,
        config: &BridgeConfig,
        publishers: PublisherSet,
    ) -> Result<Self> {
        Self::with_geometry(driver, config, publishers, SensorGeometry::default())
    }

    /// Same as [`new`](Self::new) with explicit sensor geometry.
    pub fn with_geometry(
        driver: Box<dyn CameraDriver>,
        config: &BridgeConfig,
        mut publishers: PublisherSet,
        geometry: SensorGeometry,
    ) -> Result<Self> {
        // The configuration decides the active sinks; a raw sink supplied
        // with raw transport disabled is never published to.
        if !config.capture.raw_transport {
            publishers.raw = None;
        }

        let calibration = CalibrationStore::from_config(&config.capture, geometry);
        let mut session = CameraSession::open(driver, config.capture.clone())?;
        let dispatcher =
            FrameDispatcher::new(publishers, calibration.clone(), config.frame_id.clone());
        session.start(dispatcher.into_callbacks(config.capture.motion_vectors))?;

        Ok(Self {
            session,
            calibration,
        })
    }

    /// Handle to the shared calibration record.
    pub fn calibration(&self) -> CalibrationStore {
        self.calibration.clone()
    }

    /// Replace the calibration record wholesale. Always reports success.
    pub fn set_calibration(&self, info: CalibrationInfo) -> bool {
        self.calibration.replace(info)
    }

    /// Stop capture and release the camera. When this returns, no further
    /// publication occurs.
    pub fn shutdown(mut self) -> Result<()> {
        self.session.stop_and_close()
    }
}
