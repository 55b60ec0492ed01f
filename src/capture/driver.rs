use anyhow::Result;

use crate::config::CaptureConfig;

/// Handler for one buffer type. The slice is owned by the driver and only
/// valid for the duration of the call.
pub type BufferCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Callback slots registered with a driver at capture start.
///
/// An absent slot means the buffer type is not delivered; the driver may
/// skip producing it entirely, or produce and discard it, whichever the
/// hardware allows.
#[derive(Default)]
pub struct CaptureCallbacks {
    pub on_raw: Option<BufferCallback>,
    pub on_compressed: Option<BufferCallback>,
    pub on_motion: Option<BufferCallback>,
}

/// Narrow interface to the camera hardware.
///
/// Implementations own their delivery context (typically a capture thread)
/// and invoke the registered callbacks from it. `stop` must not return
/// while a callback is running, and no callback may fire after it returns;
/// callers rely on this to tear down the objects the callbacks refer to.
pub trait CameraDriver: Send {
    /// Apply the capture configuration to the device. A configuration the
    /// device cannot satisfy is rejected here, before capture begins.
    fn configure(&mut self, config: &CaptureConfig) -> Result<()>;

    /// Begin asynchronous buffer production.
    fn start(&mut self, callbacks: CaptureCallbacks) -> Result<()>;

    /// Halt buffer production and release the device. Must tolerate being
    /// called without a preceding `start`.
    fn stop(&mut self) -> Result<()>;
}
