//! Synthetic capture backend.
//!
//! Stands in for camera hardware behind `stub://` device ids: a capture
//! thread paced at the configured frame rate generates a deterministic RGB
//! test pattern, JPEG-encodes it at the configured quality, and invokes the
//! registered callbacks. Callback slices point into scratch buffers that
//! are overwritten on the next frame, matching how hardware drivers hand
//! out transient buffer spans.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::driver::{CameraDriver, CaptureCallbacks};
use crate::config::CaptureConfig;

pub struct SyntheticDriver {
    config: Option<CaptureConfig>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticDriver {
    pub fn new() -> Self {
        Self {
            config: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Default for SyntheticDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDriver for SyntheticDriver {
    fn configure(&mut self, config: &CaptureConfig) -> Result<()> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "synthetic camera rejects {}x{} resolution",
                config.width,
                config.height
            ));
        }
        if config.quality == 0 || config.quality > 100 {
            return Err(anyhow!(
                "jpeg quality {} out of range 1-100",
                config.quality
            ));
        }
        if config.framerate == 0 {
            return Err(anyhow!("frame rate must be greater than zero"));
        }
        log::info!(
            "synthetic camera configured: {} {}x{} @ {} fps",
            config.device,
            config.width,
            config.height,
            config.framerate
        );
        self.config = Some(config.clone());
        Ok(())
    }

    fn start(&mut self, callbacks: CaptureCallbacks) -> Result<()> {
        let config = self
            .config
            .clone()
            .context("synthetic camera not configured")?;
        if self.worker.is_some() {
            return Err(anyhow!("capture already running"));
        }
        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        self.worker = Some(std::thread::spawn(move || {
            capture_loop(config, callbacks, stop);
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("capture thread panicked"))?;
        }
        Ok(())
    }
}

fn capture_loop(config: CaptureConfig, mut callbacks: CaptureCallbacks, stop: Arc<AtomicBool>) {
    let interval = Duration::from_secs(1) / config.framerate;
    let mut frame_count: u64 = 0;
    let mut raw = vec![0u8; (config.width as usize) * (config.height as usize) * 3];
    let mut jpeg = Vec::new();
    // 4 bytes per 16x16 macroblock plus one trailing column, the layout the
    // VideoCore encoder emits for inline motion vectors.
    let imv_len = ((config.width as usize / 16) + 1) * (config.height as usize / 16) * 4;
    let motion = vec![0u8; imv_len];

    while !stop.load(Ordering::SeqCst) {
        fill_test_pattern(&mut raw, frame_count);
        frame_count += 1;

        if let Some(on_raw) = callbacks.on_raw.as_mut() {
            on_raw(&raw);
        }

        if let Some(on_compressed) = callbacks.on_compressed.as_mut() {
            jpeg.clear();
            match encode_jpeg(&raw, &config, &mut jpeg) {
                Ok(()) => on_compressed(&jpeg),
                Err(err) => log::warn!("synthetic jpeg encode failed: {err:#}"),
            }
        }

        if let Some(on_motion) = callbacks.on_motion.as_mut() {
            on_motion(&motion);
        }

        std::thread::sleep(interval);
    }
}

fn fill_test_pattern(pixels: &mut [u8], frame_count: u64) {
    for (i, px) in pixels.iter_mut().enumerate() {
        *px = ((i as u64 + frame_count) % 256) as u8;
    }
}

fn encode_jpeg(rgb: &[u8], config: &CaptureConfig, out: &mut Vec<u8>) -> Result<()> {
    JpegEncoder::new_with_quality(out, config.quality)
        .write_image(rgb, config.width, config.height, ExtendedColorType::Rgb8)
        .context("encode synthetic frame")?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn test_config() -> CaptureConfig {
        CaptureConfig {
            width: 32,
            height: 16,
            framerate: 500,
            ..CaptureConfig::default()
        }
    }

    #[derive(Clone, Default)]
    struct Counter(Arc<Mutex<usize>>);

    impl Counter {
        fn callback(&self) -> super::super::BufferCallback {
            let counter = self.clone();
            Box::new(move |_buffer: &[u8]| {
                *counter.0.lock().unwrap() += 1;
            })
        }

        fn get(&self) -> usize {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn configure_rejects_invalid_settings() {
        let mut driver = SyntheticDriver::new();

        let mut config = test_config();
        config.width = 0;
        assert!(driver.configure(&config).is_err());

        let mut config = test_config();
        config.quality = 0;
        assert!(driver.configure(&config).is_err());

        let mut config = test_config();
        config.quality = 101;
        assert!(driver.configure(&config).is_err());

        let mut config = test_config();
        config.framerate = 0;
        assert!(driver.configure(&config).is_err());
    }

    #[test]
    fn start_requires_configure() {
        let mut driver = SyntheticDriver::new();
        assert!(driver.start(CaptureCallbacks::default()).is_err());
    }

    #[test]
    fn delivers_to_every_registered_slot() {
        let mut driver = SyntheticDriver::new();
        driver.configure(&test_config()).unwrap();

        let raw = Counter::default();
        let compressed = Counter::default();
        let motion = Counter::default();
        driver
            .start(CaptureCallbacks {
                on_raw: Some(raw.callback()),
                on_compressed: Some(compressed.callback()),
                on_motion: Some(motion.callback()),
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(80));
        driver.stop().unwrap();

        assert!(raw.get() > 0);
        assert!(compressed.get() > 0);
        assert!(motion.get() > 0);
    }

    #[test]
    fn absent_slots_receive_nothing() {
        let mut driver = SyntheticDriver::new();
        driver.configure(&test_config()).unwrap();

        let compressed = Counter::default();
        driver
            .start(CaptureCallbacks {
                on_raw: None,
                on_compressed: Some(compressed.callback()),
                on_motion: None,
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(60));
        driver.stop().unwrap();
        assert!(compressed.get() > 0);
    }

    #[test]
    fn no_callback_fires_after_stop_returns() {
        let mut driver = SyntheticDriver::new();
        driver.configure(&test_config()).unwrap();

        let compressed = Counter::default();
        driver
            .start(CaptureCallbacks {
                on_raw: None,
                on_compressed: Some(compressed.callback()),
                on_motion: None,
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(40));
        driver.stop().unwrap();

        let after_stop = compressed.get();
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(compressed.get(), after_stop);
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let mut driver = SyntheticDriver::new();
        driver.stop().unwrap();
        driver.configure(&test_config()).unwrap();
        driver.stop().unwrap();
    }

    #[test]
    fn compressed_frames_are_jpeg() {
        let mut driver = SyntheticDriver::new();
        driver.configure(&test_config()).unwrap();

        let magic: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
        let sniff = magic.clone();
        driver
            .start(CaptureCallbacks {
                on_raw: None,
                on_compressed: Some(Box::new(move |buffer: &[u8]| {
                    sniff.lock().unwrap().get_or_insert_with(|| buffer[..2].to_vec());
                })),
                on_motion: None,
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(60));
        driver.stop().unwrap();

        let magic = magic.lock().unwrap().clone().expect("no compressed frame");
        assert_eq!(magic, vec![0xff, 0xd8]);
    }
}
