//! Capture session and camera driver backends.
//!
//! A [`CameraSession`] owns one [`CameraDriver`] and walks it through the
//! `Created -> Configured -> Capturing -> Closed` lifecycle. Drivers invoke
//! the registered callbacks on their own capture context; the buffer slices
//! they pass are valid only for the duration of the call, so handlers copy
//! out anything they keep.

mod driver;
mod session;
mod synthetic;
#[cfg(feature = "driver-v4l2")]
mod v4l2;

pub use driver::{BufferCallback, CameraDriver, CaptureCallbacks};
pub use session::{CameraSession, SessionState};
pub use synthetic::SyntheticDriver;
#[cfg(feature = "driver-v4l2")]
pub use v4l2::V4l2Driver;
