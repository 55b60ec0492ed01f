//! Camera capture-and-publish bridge.
//!
//! The bridge configures a camera capture session, receives raw and
//! compressed frame buffers via callback, timestamps them, and republishes
//! them together with synchronized calibration metadata to a set of
//! publication sinks. An external caller may replace the calibration record
//! at any time, either in-process through [`CameraBridge::set_calibration`]
//! or over the loopback service in [`api`].
//!
//! # Module Structure
//!
//! - `config`: capture configuration and daemon settings (file + env)
//! - `capture`: driver boundary, session lifecycle, capture backends
//! - `bridge`: construction and teardown entry points
//! - `dispatch`: callback bodies pairing each frame with an info publish
//! - `calibration`: the shared calibration record and intrinsics math
//! - `sink`: publication sink boundary
//! - `messages`: outbound payload records
//! - `api`: loopback calibration update service

pub mod api;
pub mod bridge;
pub mod calibration;
pub mod capture;
pub mod config;
pub mod dispatch;
pub mod messages;
pub mod sink;

pub use bridge::CameraBridge;
pub use calibration::{CalibrationInfo, CalibrationStore, SensorGeometry};
#[cfg(feature = "driver-v4l2")]
pub use capture::V4l2Driver;
pub use capture::{
    BufferCallback, CameraDriver, CameraSession, CaptureCallbacks, SessionState, SyntheticDriver,
};
pub use config::{BridgeConfig, CaptureConfig, MqttSettings, TuningParams};
pub use dispatch::FrameDispatcher;
pub use messages::{CompressedFrame, ImageFrame, Timestamp, COMPRESSED_FORMAT, RAW_ENCODING};
pub use sink::{FnSink, PublishJournal, PublishRecord, PublisherSet, RecordingSink, Sink};
