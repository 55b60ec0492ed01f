//! Frame dispatch: the callback bodies bound to a capture session.
//!
//! Each slot stamps the incoming buffer once, publishes the frame message,
//! then publishes a calibration snapshot carrying the identical label and
//! stamp. Consumers correlate a frame with its calibration by matching
//! stamps; no separate synchronization protocol exists. When both the raw
//! and the compressed slot fire for one logical frame, two calibration
//! publications occur; the duplication is deliberate and left to consumers.

use std::sync::Arc;

use crate::calibration::CalibrationStore;
use crate::capture::{BufferCallback, CaptureCallbacks};
use crate::messages::{CompressedFrame, ImageFrame, Timestamp, COMPRESSED_FORMAT, RAW_ENCODING};
use crate::sink::PublisherSet;

/// Builds the callbacks a capture session runs on buffer arrival.
pub struct FrameDispatcher {
    shared: Arc<Shared>,
}

struct Shared {
    publishers: PublisherSet,
    calibration: CalibrationStore,
    frame_id: String,
}

impl FrameDispatcher {
    pub fn new(
        publishers: PublisherSet,
        calibration: CalibrationStore,
        frame_id: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                publishers,
                calibration,
                frame_id: frame_id.into(),
            }),
        }
    }

    /// Produce the callback set for the enabled sinks.
    ///
    /// The raw slot is registered only when a raw sink exists and the
    /// motion slot only when requested, so disabled channels never allocate
    /// an outbound message.
    pub fn into_callbacks(self, motion_vectors: bool) -> CaptureCallbacks {
        let on_raw: Option<BufferCallback> = self.shared.publishers.raw.is_some().then(|| {
            let shared = self.shared.clone();
            Box::new(move |buffer: &[u8]| shared.publish_raw(buffer)) as BufferCallback
        });

        let shared = self.shared.clone();
        let on_compressed: Option<BufferCallback> =
            Some(Box::new(move |buffer: &[u8]| shared.publish_compressed(buffer)));

        let on_motion: Option<BufferCallback> = motion_vectors.then(|| {
            // Motion vectors are received and discarded; the slot exists as
            // an extension point.
            Box::new(move |_buffer: &[u8]| {}) as BufferCallback
        });

        CaptureCallbacks {
            on_raw,
            on_compressed,
            on_motion,
        }
    }
}

impl Shared {
    fn publish_raw(&self, buffer: &[u8]) {
        let Some(raw) = self.publishers.raw.as_ref() else {
            return;
        };
        let stamp = Timestamp::now();
        let frame = ImageFrame {
            frame_id: self.frame_id.clone(),
            stamp,
            encoding: RAW_ENCODING.to_string(),
            data: buffer.to_vec(),
        };
        if let Err(err) = raw.publish(frame) {
            log::warn!("raw image publish failed: {err:#}");
        }
        self.publish_info(stamp);
    }

    fn publish_compressed(&self, buffer: &[u8]) {
        let stamp = Timestamp::now();
        let frame = CompressedFrame {
            frame_id: self.frame_id.clone(),
            stamp,
            format: COMPRESSED_FORMAT.to_string(),
            data: buffer.to_vec(),
        };
        if let Err(err) = self.publishers.compressed.publish(frame) {
            log::warn!("compressed image publish failed: {err:#}");
        }
        self.publish_info(stamp);
    }

    fn publish_info(&self, stamp: Timestamp) {
        let info = self.calibration.snapshot_with_stamp(&self.frame_id, stamp);
        if let Err(err) = self.publishers.info.publish(info) {
            log::warn!("camera info publish failed: {err:#}");
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
