use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const DEFAULT_FRAMERATE: u32 = 90;
const DEFAULT_QUALITY: u8 = 80;
const DEFAULT_DEVICE: &str = "stub://camera";
const DEFAULT_FRAME_ID: &str = "camera";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8790";
const DEFAULT_MQTT_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_MQTT_CLIENT_ID: &str = "picam-bridge";
const DEFAULT_TOPIC_PREFIX: &str = "picam";
const DEFAULT_COLOUR_U: u8 = 128;
const DEFAULT_COLOUR_V: u8 = 128;

#[derive(Debug, Deserialize, Default)]
struct BridgeConfigFile {
    frame_id: Option<String>,
    capture: Option<CaptureConfigFile>,
    tuning: Option<TuningConfigFile>,
    api: Option<ApiConfigFile>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    quality: Option<u8>,
    device: Option<String>,
    camera_id: Option<i32>,
    raw_transport: Option<bool>,
    motion_vectors: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TuningConfigFile {
    sharpness: Option<i32>,
    contrast: Option<i32>,
    brightness: Option<i32>,
    saturation: Option<i32>,
    iso: Option<i32>,
    video_stabilisation: Option<bool>,
    exposure_compensation: Option<i32>,
    colour_effects: Option<ColourEffectsFile>,
    rotation: Option<i32>,
    hflip: Option<bool>,
    vflip: Option<bool>,
    roi: Option<RoiFile>,
    shutter_speed: Option<u32>,
    awb_gains_r: Option<f32>,
    awb_gains_b: Option<f32>,
    analog_gain: Option<f32>,
    digital_gain: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ColourEffectsFile {
    enable: Option<bool>,
    u: Option<u8>,
    v: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct RoiFile {
    x: Option<f64>,
    y: Option<f64>,
    w: Option<f64>,
    h: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker_addr: Option<String>,
    client_id: Option<String>,
    topic_prefix: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Colour effect toggle with fixed chroma channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColourEffects {
    pub enable: bool,
    pub u: u8,
    pub v: u8,
}

impl Default for ColourEffects {
    fn default() -> Self {
        Self {
            enable: false,
            u: DEFAULT_COLOUR_U,
            v: DEFAULT_COLOUR_V,
        }
    }
}

/// Normalised region-of-interest rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionOfInterest {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 0.0,
            h: 1.0,
        }
    }
}

/// Imaging tunables passed through to the camera driver.
#[derive(Clone, Debug, PartialEq)]
pub struct TuningParams {
    pub sharpness: i32,
    pub contrast: i32,
    pub brightness: i32,
    pub saturation: i32,
    pub iso: i32,
    pub video_stabilisation: bool,
    pub exposure_compensation: i32,
    pub colour_effects: ColourEffects,
    pub rotation: i32,
    pub hflip: bool,
    pub vflip: bool,
    pub roi: RegionOfInterest,
    pub shutter_speed: u32,
    pub awb_gains_r: f32,
    pub awb_gains_b: f32,
    pub analog_gain: f32,
    pub digital_gain: f32,
}

impl Default for TuningParams {
    fn default() -> Self {
        Self {
            sharpness: 0,
            contrast: 0,
            brightness: 0,
            saturation: 0,
            iso: 0,
            video_stabilisation: false,
            exposure_compensation: 0,
            colour_effects: ColourEffects::default(),
            rotation: 0,
            hflip: false,
            vflip: false,
            roi: RegionOfInterest::default(),
            shutter_speed: 0,
            awb_gains_r: 0.0,
            awb_gains_b: 0.0,
            analog_gain: 0.0,
            digital_gain: 0.0,
        }
    }
}

/// Capture configuration. Immutable once a session is opened with it.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub quality: u8,
    pub device: String,
    pub camera_id: i32,
    pub raw_transport: bool,
    pub motion_vectors: bool,
    pub tuning: TuningParams,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            framerate: DEFAULT_FRAMERATE,
            quality: DEFAULT_QUALITY,
            device: DEFAULT_DEVICE.to_string(),
            camera_id: 0,
            raw_transport: true,
            motion_vectors: false,
            tuning: TuningParams::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub broker_addr: String,
    pub client_id: String,
    pub topic_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_addr: DEFAULT_MQTT_ADDR.to_string(),
            client_id: DEFAULT_MQTT_CLIENT_ID.to_string(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            username: None,
            password: None,
        }
    }
}

/// Full daemon configuration: capture settings plus the publication and
/// update-service endpoints.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub frame_id: String,
    pub capture: CaptureConfig,
    pub api_addr: String,
    pub mqtt: MqttSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            frame_id: DEFAULT_FRAME_ID.to_string(),
            capture: CaptureConfig::default(),
            api_addr: DEFAULT_API_ADDR.to_string(),
            mqtt: MqttSettings::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration: `PICAM_CONFIG` file (if set), then `PICAM_*`
    /// environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PICAM_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Same as [`load`](Self::load) with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => BridgeConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BridgeConfigFile) -> Self {
        let mut cfg = Self::default();

        if let Some(frame_id) = file.frame_id {
            cfg.frame_id = frame_id;
        }

        let capture = file.capture.unwrap_or_default();
        if let Some(v) = capture.width {
            cfg.capture.width = v;
        }
        if let Some(v) = capture.height {
            cfg.capture.height = v;
        }
        if let Some(v) = capture.fps {
            cfg.capture.framerate = v;
        }
        if let Some(v) = capture.quality {
            cfg.capture.quality = v;
        }
        if let Some(v) = capture.device {
            cfg.capture.device = v;
        }
        if let Some(v) = capture.camera_id {
            cfg.capture.camera_id = v;
        }
        if let Some(v) = capture.raw_transport {
            cfg.capture.raw_transport = v;
        }
        if let Some(v) = capture.motion_vectors {
            cfg.capture.motion_vectors = v;
        }

        let tuning = file.tuning.unwrap_or_default();
        let t = &mut cfg.capture.tuning;
        if let Some(v) = tuning.sharpness {
            t.sharpness = v;
        }
        if let Some(v) = tuning.contrast {
            t.contrast = v;
        }
        if let Some(v) = tuning.brightness {
            t.brightness = v;
        }
        if let Some(v) = tuning.saturation {
            t.saturation = v;
        }
        if let Some(v) = tuning.iso {
            t.iso = v;
        }
        if let Some(v) = tuning.video_stabilisation {
            t.video_stabilisation = v;
        }
        if let Some(v) = tuning.exposure_compensation {
            t.exposure_compensation = v;
        }
        if let Some(ce) = tuning.colour_effects {
            if let Some(v) = ce.enable {
                t.colour_effects.enable = v;
            }
            if let Some(v) = ce.u {
                t.colour_effects.u = v;
            }
            if let Some(v) = ce.v {
                t.colour_effects.v = v;
            }
        }
        if let Some(v) = tuning.rotation {
            t.rotation = v;
        }
        if let Some(v) = tuning.hflip {
            t.hflip = v;
        }
        if let Some(v) = tuning.vflip {
            t.vflip = v;
        }
        if let Some(roi) = tuning.roi {
            if let Some(v) = roi.x {
                t.roi.x = v;
            }
            if let Some(v) = roi.y {
                t.roi.y = v;
            }
            if let Some(v) = roi.w {
                t.roi.w = v;
            }
            if let Some(v) = roi.h {
                t.roi.h = v;
            }
        }
        if let Some(v) = tuning.shutter_speed {
            t.shutter_speed = v;
        }
        if let Some(v) = tuning.awb_gains_r {
            t.awb_gains_r = v;
        }
        if let Some(v) = tuning.awb_gains_b {
            t.awb_gains_b = v;
        }
        if let Some(v) = tuning.analog_gain {
            t.analog_gain = v;
        }
        if let Some(v) = tuning.digital_gain {
            t.digital_gain = v;
        }

        if let Some(api) = file.api {
            if let Some(addr) = api.addr {
                cfg.api_addr = addr;
            }
        }

        let mqtt = file.mqtt.unwrap_or_default();
        if let Some(v) = mqtt.broker_addr {
            cfg.mqtt.broker_addr = v;
        }
        if let Some(v) = mqtt.client_id {
            cfg.mqtt.client_id = v;
        }
        if let Some(v) = mqtt.topic_prefix {
            cfg.mqtt.topic_prefix = v;
        }
        cfg.mqtt.username = mqtt.username;
        cfg.mqtt.password = mqtt.password;

        cfg
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = env_string("PICAM_DEVICE") {
            self.capture.device = device;
        }
        if let Some(width) = env_parse_u32("PICAM_WIDTH")? {
            self.capture.width = width;
        }
        if let Some(height) = env_parse_u32("PICAM_HEIGHT")? {
            self.capture.height = height;
        }
        if let Some(fps) = env_parse_u32("PICAM_FPS")? {
            self.capture.framerate = fps;
        }
        if let Some(quality) = env_parse_u8("PICAM_QUALITY")? {
            self.capture.quality = quality;
        }
        if let Some(camera_id) = env_parse_i32("PICAM_CAMERA_ID")? {
            self.capture.camera_id = camera_id;
        }
        if let Some(raw) = env_parse_bool("PICAM_RAW_TRANSPORT")? {
            self.capture.raw_transport = raw;
        }
        if let Some(motion) = env_parse_bool("PICAM_MOTION_VECTORS")? {
            self.capture.motion_vectors = motion;
        }
        if let Some(frame_id) = env_string("PICAM_FRAME_ID") {
            self.frame_id = frame_id;
        }
        if let Some(addr) = env_string("PICAM_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(addr) = env_string("PICAM_MQTT_ADDR") {
            self.mqtt.broker_addr = addr;
        }
        if let Some(prefix) = env_string("PICAM_TOPIC_PREFIX") {
            self.mqtt.topic_prefix = prefix;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!(
                "capture resolution {}x{} is invalid",
                self.capture.width,
                self.capture.height
            ));
        }
        if self.capture.framerate == 0 {
            return Err(anyhow!("frame rate must be greater than zero"));
        }
        if self.capture.quality == 0 || self.capture.quality > 100 {
            return Err(anyhow!(
                "jpeg quality {} out of range 1-100",
                self.capture.quality
            ));
        }
        if self.frame_id.trim().is_empty() {
            return Err(anyhow!("frame_id must not be empty"));
        }
        if self.mqtt.topic_prefix.trim().is_empty() {
            return Err(anyhow!("mqtt topic prefix must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<BridgeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn env_parse_u32(key: &str) -> Result<Option<u32>> {
    let Some(raw) = env_string(key) else {
        return Ok(None);
    };
    let value = raw
        .trim()
        .parse()
        .map_err(|_| anyhow!("{key} must be an unsigned integer"))?;
    Ok(Some(value))
}

fn env_parse_u8(key: &str) -> Result<Option<u8>> {
    let Some(raw) = env_string(key) else {
        return Ok(None);
    };
    let value = raw
        .trim()
        .parse()
        .map_err(|_| anyhow!("{key} must be an integer between 0 and 255"))?;
    Ok(Some(value))
}

fn env_parse_i32(key: &str) -> Result<Option<i32>> {
    let Some(raw) = env_string(key) else {
        return Ok(None);
    };
    let value = raw
        .trim()
        .parse()
        .map_err(|_| anyhow!("{key} must be an integer"))?;
    Ok(Some(value))
}

fn env_parse_bool(key: &str) -> Result<Option<bool>> {
    let Some(raw) = env_string(key) else {
        return Ok(None);
    };
    match raw.trim() {
        "1" | "true" | "on" => Ok(Some(true)),
        "0" | "false" | "off" => Ok(Some(false)),
        _ => Err(anyhow!("{key} must be one of 1/0/true/false/on/off")),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_defaults_match_the_stated_parameter_table() {
        let cfg = CaptureConfig::default();
        assert_eq!(cfg.width, 320);
        assert_eq!(cfg.height, 240);
        assert_eq!(cfg.framerate, 90);
        assert_eq!(cfg.quality, 80);
        assert_eq!(cfg.camera_id, 0);
        assert!(cfg.raw_transport);
        assert!(!cfg.motion_vectors);

        let t = cfg.tuning;
        assert_eq!(t.sharpness, 0);
        assert_eq!(t.contrast, 0);
        assert_eq!(t.brightness, 0);
        assert_eq!(t.saturation, 0);
        assert_eq!(t.iso, 0);
        assert!(!t.video_stabilisation);
        assert_eq!(t.exposure_compensation, 0);
        assert!(!t.colour_effects.enable);
        assert_eq!(t.colour_effects.u, 128);
        assert_eq!(t.colour_effects.v, 128);
        assert_eq!(t.rotation, 0);
        assert!(!t.hflip);
        assert!(!t.vflip);
        assert_eq!(
            t.roi,
            RegionOfInterest {
                x: 0.0,
                y: 0.0,
                w: 0.0,
                h: 1.0
            }
        );
        assert_eq!(t.shutter_speed, 0);
        assert_eq!(t.awb_gains_r, 0.0);
        assert_eq!(t.awb_gains_b, 0.0);
        assert_eq!(t.analog_gain, 0.0);
        assert_eq!(t.digital_gain, 0.0);
    }

    #[test]
    fn validate_rejects_degenerate_settings() {
        let mut cfg = BridgeConfig::default();
        cfg.capture.width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::default();
        cfg.capture.quality = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::default();
        cfg.capture.quality = 101;
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::default();
        cfg.capture.framerate = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::default();
        cfg.frame_id = " ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_config_file_keeps_defaults_elsewhere() {
        let file: BridgeConfigFile =
            serde_json::from_str(r#"{"capture": {"width": 640, "quality": 55}}"#).unwrap();
        let cfg = BridgeConfig::from_file(file);
        assert_eq!(cfg.capture.width, 640);
        assert_eq!(cfg.capture.height, 240);
        assert_eq!(cfg.capture.quality, 55);
        assert_eq!(cfg.capture.framerate, 90);
        assert_eq!(cfg.frame_id, "camera");
        assert_eq!(cfg.mqtt.topic_prefix, "picam");
    }
}
