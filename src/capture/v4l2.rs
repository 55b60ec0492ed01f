//! V4L2 capture backend.
//!
//! Adapts a `/dev/video*` device to the [`CameraDriver`] interface using
//! libv4l. The device is opened and format-negotiated during `configure`;
//! `start` moves the mapped stream onto a capture thread that delivers raw
//! RGB buffers and JPEG compressions of them. Motion vectors are never
//! produced on this backend.
//!
//! Only resolution, frame rate, and JPEG quality are applied to the device;
//! the remaining tuning parameters are ignored by libv4l capture.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use ouroboros::self_referencing;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::driver::{CameraDriver, CaptureCallbacks};
use crate::config::CaptureConfig;

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Driver {
    state: Option<DeviceState>,
    active: Option<ActiveFormat>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

#[derive(Clone, Copy)]
struct ActiveFormat {
    width: u32,
    height: u32,
    quality: u8,
}

impl V4l2Driver {
    pub fn new() -> Self {
        Self {
            state: None,
            active: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Default for V4l2Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDriver for V4l2Driver {
    fn configure(&mut self, config: &CaptureConfig) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = device_path(config);
        let mut device = v4l::Device::with_path(&path)
            .with_context(|| format!("open v4l2 device {path}"))?;

        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");
        let format = device.set_format(&format).context("set v4l2 format")?;
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(anyhow!(
                "device {} does not support RGB3 capture (offered {:?})",
                path,
                format.fourcc
            ));
        }
        if format.width != config.width || format.height != config.height {
            log::warn!(
                "v4l2 device adjusted resolution {}x{} -> {}x{}",
                config.width,
                config.height,
                format.width,
                format.height
            );
        }

        let params = v4l::video::capture::Parameters::with_fps(config.framerate);
        if let Err(err) = device.set_params(&params) {
            log::warn!("failed to set frame rate on {path}: {err}");
        }

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        self.state = Some(state);
        self.active = Some(ActiveFormat {
            width: format.width,
            height: format.height,
            quality: config.quality,
        });
        log::info!(
            "v4l2 camera configured: {} {}x{}",
            path,
            format.width,
            format.height
        );
        Ok(())
    }

    fn start(&mut self, callbacks: CaptureCallbacks) -> Result<()> {
        let state = self.state.take().context("v4l2 device not configured")?;
        let active = self.active.context("v4l2 device not configured")?;
        if self.worker.is_some() {
            return Err(anyhow!("capture already running"));
        }
        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        self.worker = Some(std::thread::spawn(move || {
            capture_loop(state, active, callbacks, stop);
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        // Releases the device when capture never started.
        self.state = None;
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("capture thread panicked"))?;
        }
        Ok(())
    }
}

fn device_path(config: &CaptureConfig) -> String {
    if config.device.starts_with("/dev/") {
        config.device.clone()
    } else {
        format!("/dev/video{}", config.camera_id)
    }
}

fn capture_loop(
    mut state: DeviceState,
    active: ActiveFormat,
    mut callbacks: CaptureCallbacks,
    stop: Arc<AtomicBool>,
) {
    use v4l::io::traits::CaptureStream;

    let mut jpeg = Vec::new();
    while !stop.load(Ordering::SeqCst) {
        let next = state.with_stream_mut(|stream| stream.next());
        let (buf, _meta) = match next {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!("v4l2 capture error: {err}");
                break;
            }
        };

        if let Some(on_raw) = callbacks.on_raw.as_mut() {
            on_raw(buf);
        }

        if let Some(on_compressed) = callbacks.on_compressed.as_mut() {
            jpeg.clear();
            let encoded = JpegEncoder::new_with_quality(&mut jpeg, active.quality).write_image(
                buf,
                active.width,
                active.height,
                ExtendedColorType::Rgb8,
            );
            match encoded {
                Ok(()) => on_compressed(&jpeg),
                Err(err) => log::warn!("jpeg encode failed: {err}"),
            }
        }
    }
}
