//! Outbound message records.
//!
//! These are the payloads the bridge hands to its publication sinks. Frame
//! messages never carry calibration data; consumers pair a frame with the
//! [`CalibrationInfo`](crate::calibration::CalibrationInfo) publication that
//! follows it by matching timestamps.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Pixel encoding of raw frames produced by the capture backends.
pub const RAW_ENCODING: &str = "rgb8";

/// Container format of compressed frames.
pub const COMPRESSED_FORMAT: &str = "jpeg";

/// Wall-clock capture timestamp with nanosecond resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
}

impl Timestamp {
    /// Current wall-clock time. A clock before the epoch collapses to zero.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: elapsed.as_secs(),
            nanos: elapsed.subsec_nanos(),
        }
    }
}

/// Raw image message: label, stamp, fixed encoding, pixel bytes verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageFrame {
    pub frame_id: String,
    pub stamp: Timestamp,
    pub encoding: String,
    pub data: Vec<u8>,
}

/// Compressed image message: label, stamp, fixed container format,
/// compressed bytes verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompressedFrame {
    pub frame_id: String,
    pub stamp: Timestamp,
    pub format: String,
    pub data: Vec<u8>,
}
