//! Camera calibration record and the shared store it lives in.
//!
//! The intrinsic matrix is computed once from the capture resolution and the
//! physical sensor geometry. It changes only when an external caller
//! replaces the whole record through [`CalibrationStore::replace`]; stamping
//! a snapshot for publication never touches it.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::CaptureConfig;
use crate::messages::Timestamp;

/// Physical sensor geometry used to derive focal lengths.
///
/// Defaults match the Raspberry Pi Camera Module v1: 3.60 mm focal length
/// over a 3.76 x 2.74 mm active sensor area.
#[derive(Clone, Copy, Debug)]
pub struct SensorGeometry {
    pub focal_length_mm: f64,
    pub sensor_width_mm: f64,
    pub sensor_height_mm: f64,
}

impl Default for SensorGeometry {
    fn default() -> Self {
        Self {
            focal_length_mm: 3.60,
            sensor_width_mm: 3.76,
            sensor_height_mm: 2.74,
        }
    }
}

/// Camera intrinsics published alongside every frame.
///
/// `k` is the row-major 3x3 intrinsic matrix `[fx 0 cx; 0 fy cy; 0 0 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationInfo {
    #[serde(default)]
    pub frame_id: String,
    #[serde(default)]
    pub stamp: Timestamp,
    pub width: u32,
    pub height: u32,
    pub k: [f64; 9],
}

impl CalibrationInfo {
    /// Derive intrinsics for a capture resolution.
    ///
    /// Focal lengths scale linearly with the configured resolution; the
    /// principal point sits at the exact image center.
    pub fn from_resolution(width: u32, height: u32, geometry: SensorGeometry) -> Self {
        let fx = (geometry.focal_length_mm / geometry.sensor_width_mm) * f64::from(width);
        let fy = (geometry.focal_length_mm / geometry.sensor_height_mm) * f64::from(height);
        let cx = f64::from(width) / 2.0;
        let cy = f64::from(height) / 2.0;
        Self {
            frame_id: String::new(),
            stamp: Timestamp::default(),
            width,
            height,
            k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
        }
    }
}

/// Shared calibration record.
///
/// Frame callbacks read the record on the capture context while the update
/// service writes it from its own thread, so access goes through a mutex.
/// Clones share the same record.
#[derive(Clone)]
pub struct CalibrationStore {
    inner: Arc<Mutex<CalibrationInfo>>,
}

impl CalibrationStore {
    pub fn new(info: CalibrationInfo) -> Self {
        Self {
            inner: Arc::new(Mutex::new(info)),
        }
    }

    /// Store seeded from the capture resolution and sensor geometry.
    pub fn from_config(config: &CaptureConfig, geometry: SensorGeometry) -> Self {
        Self::new(CalibrationInfo::from_resolution(
            config.width,
            config.height,
            geometry,
        ))
    }

    /// Overwrite the whole record.
    ///
    /// No validation is performed; a physically nonsensical matrix is
    /// accepted, and the call always reports success.
    pub fn replace(&self, info: CalibrationInfo) -> bool {
        *self.lock() = info;
        true
    }

    /// Current record with label and stamp overwritten. Dimensions and the
    /// intrinsic matrix are returned untouched.
    pub fn snapshot_with_stamp(&self, frame_id: &str, stamp: Timestamp) -> CalibrationInfo {
        let mut info = self.lock().clone();
        info.frame_id = frame_id.to_string();
        info.stamp = stamp;
        info
    }

    /// Current record as stored.
    pub fn current(&self) -> CalibrationInfo {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, CalibrationInfo> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_point_is_image_center() {
        for (w, h) in [(320, 240), (640, 480), (1920, 1080), (1, 1)] {
            let info = CalibrationInfo::from_resolution(w, h, SensorGeometry::default());
            assert_eq!(info.k[2], f64::from(w) / 2.0);
            assert_eq!(info.k[5], f64::from(h) / 2.0);
        }
    }

    #[test]
    fn focal_lengths_scale_linearly_with_resolution() {
        let geometry = SensorGeometry::default();
        let base = CalibrationInfo::from_resolution(320, 240, geometry);
        let doubled = CalibrationInfo::from_resolution(640, 480, geometry);
        assert!((doubled.k[0] - 2.0 * base.k[0]).abs() < 1e-9);
        assert!((doubled.k[4] - 2.0 * base.k[4]).abs() < 1e-9);
    }

    #[test]
    fn default_geometry_matches_camera_module_v1() {
        let info = CalibrationInfo::from_resolution(320, 240, SensorGeometry::default());
        assert!((info.k[0] - 306.38).abs() < 0.01, "fx = {}", info.k[0]);
        assert!((info.k[4] - 315.33).abs() < 0.01, "fy = {}", info.k[4]);
        assert_eq!(info.k[2], 160.0);
        assert_eq!(info.k[5], 120.0);
        assert_eq!(info.k[8], 1.0);
    }

    #[test]
    fn replace_overwrites_the_whole_record() {
        let store = CalibrationStore::new(CalibrationInfo::from_resolution(
            320,
            240,
            SensorGeometry::default(),
        ));
        let nonsense = CalibrationInfo {
            frame_id: "bench".to_string(),
            stamp: Timestamp::default(),
            width: 7,
            height: 9,
            k: [-1.0; 9],
        };
        assert!(store.replace(nonsense.clone()));
        assert_eq!(store.current(), nonsense);
    }

    #[test]
    fn snapshot_stamps_without_touching_the_matrix() {
        let store = CalibrationStore::new(CalibrationInfo::from_resolution(
            320,
            240,
            SensorGeometry::default(),
        ));
        let before = store.current();
        let stamp = Timestamp {
            secs: 42,
            nanos: 170,
        };
        let snapshot = store.snapshot_with_stamp("camera", stamp);
        assert_eq!(snapshot.frame_id, "camera");
        assert_eq!(snapshot.stamp, stamp);
        assert_eq!(snapshot.k, before.k);
        assert_eq!(snapshot.width, before.width);
        assert_eq!(snapshot.height, before.height);
        // The stored record keeps its own label and stamp.
        assert_eq!(store.current(), before);
    }
}
