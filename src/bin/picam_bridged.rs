//! picam_bridged - camera capture-and-publish daemon.
//!
//! This daemon:
//! 1. Loads bridge configuration (file, environment, flags)
//! 2. Selects a camera driver for the configured device
//! 3. Publishes frames and calibration records to MQTT topics
//! 4. Accepts calibration replacements over MQTT and the loopback API
//! 5. Runs until interrupted
//!
//! Topic layout under the configured prefix: `image` and
//! `image/compressed` carry the frame payload bytes verbatim;
//! `image/camera_info` carries the calibration record as JSON, stamped so
//! consumers can pair it with the frame published just before it.
//! `set_camera_info` is subscribed for inbound replacement records.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, Incoming, MqttOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use picam_bridge::{
    api::{ApiConfig, ApiServer},
    calibration::{CalibrationInfo, CalibrationStore},
    config::BridgeConfig,
    sink::{FnSink, PublisherSet, Sink},
    CameraBridge, CameraDriver, CompressedFrame, ImageFrame, SyntheticDriver,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Camera capture-and-publish bridge daemon")]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, env = "PICAM_CONFIG")]
    config: Option<PathBuf>,

    /// Camera device override (stub://... or /dev/video*).
    #[arg(long)]
    device: Option<String>,

    /// MQTT broker address override (host:port).
    #[arg(long)]
    mqtt_addr: Option<String>,

    /// MQTT topic prefix override.
    #[arg(long)]
    topic_prefix: Option<String>,

    /// Loopback API address override.
    #[arg(long)]
    api_addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = BridgeConfig::load_from(args.config.as_deref())?;
    if let Some(device) = args.device {
        cfg.capture.device = device;
    }
    if let Some(addr) = args.mqtt_addr {
        cfg.mqtt.broker_addr = addr;
    }
    if let Some(prefix) = args.topic_prefix {
        cfg.mqtt.topic_prefix = prefix;
    }
    if let Some(addr) = args.api_addr {
        cfg.api_addr = addr;
    }

    log::info!("picam_bridged starting");
    log::info!(
        "  device: {} ({}x{} @ {} fps, quality {})",
        cfg.capture.device,
        cfg.capture.width,
        cfg.capture.height,
        cfg.capture.framerate,
        cfg.capture.quality
    );
    log::info!("  raw transport: {}", cfg.capture.raw_transport);
    log::info!("  motion vectors: {}", cfg.capture.motion_vectors);
    log::info!("  mqtt broker: {}", cfg.mqtt.broker_addr);
    log::info!("  topic prefix: {}", cfg.mqtt.topic_prefix);

    let (client, connection) = connect_mqtt(&cfg)?;
    let publishers = build_publishers(&cfg, &client);

    let driver = select_driver(&cfg)?;
    let bridge = CameraBridge::new(driver, &cfg, publishers)?;

    let api_handle = ApiServer::new(
        ApiConfig {
            addr: cfg.api_addr.clone(),
        },
        bridge.calibration(),
    )
    .spawn()?;
    log::info!("calibration api listening on {}", api_handle.addr);

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = running.clone();
    ctrlc::set_handler(move || {
        running_ctrlc.store(false, Ordering::SeqCst);
    })
    .context("install signal handler")?;

    let set_topic = format!("{}/set_camera_info", cfg.mqtt.topic_prefix);
    run_event_loop(connection, &client, &set_topic, bridge.calibration(), &running);

    log::info!("shutting down");
    api_handle.stop()?;
    bridge.shutdown()?;
    Ok(())
}

fn connect_mqtt(cfg: &BridgeConfig) -> Result<(Client, Connection)> {
    let (host, port) = split_host_port(&cfg.mqtt.broker_addr)?;
    let mut options = MqttOptions::new(&cfg.mqtt.client_id, host, port);
    options.set_keep_alive(Duration::from_secs(60));
    options.set_clean_start(true);
    if let Some(user) = &cfg.mqtt.username {
        options.set_credentials(user, cfg.mqtt.password.clone().unwrap_or_default());
    }
    let (client, connection) = Client::new(options, 64);
    Ok((client, connection))
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("broker address '{addr}' must be host:port"))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid broker port in '{addr}'"))?;
    Ok((host.to_string(), port))
}

/// MQTT-backed sinks. Publishes are non-blocking; a full request queue
/// fails the publish, which the dispatcher logs and drops.
fn build_publishers(cfg: &BridgeConfig, client: &Client) -> PublisherSet {
    let prefix = &cfg.mqtt.topic_prefix;
    let raw_topic = format!("{prefix}/image");
    let compressed_topic = format!("{prefix}/image/compressed");
    let info_topic = format!("{prefix}/image/camera_info");

    let raw = cfg.capture.raw_transport.then(|| {
        let client = client.clone();
        Arc::new(FnSink(move |frame: ImageFrame| -> Result<()> {
            client.try_publish(raw_topic.as_str(), QoS::AtMostOnce, false, frame.data)?;
            Ok(())
        })) as Arc<dyn Sink<ImageFrame>>
    });

    let compressed = {
        let client = client.clone();
        Arc::new(FnSink(move |frame: CompressedFrame| -> Result<()> {
            client.try_publish(compressed_topic.as_str(), QoS::AtMostOnce, false, frame.data)?;
            Ok(())
        })) as Arc<dyn Sink<CompressedFrame>>
    };

    let info = {
        let client = client.clone();
        Arc::new(FnSink(move |info: CalibrationInfo| -> Result<()> {
            let payload = serde_json::to_vec(&info)?;
            client.try_publish(info_topic.as_str(), QoS::AtMostOnce, false, payload)?;
            Ok(())
        })) as Arc<dyn Sink<CalibrationInfo>>
    };

    PublisherSet {
        raw,
        compressed,
        info,
    }
}

fn select_driver(cfg: &BridgeConfig) -> Result<Box<dyn CameraDriver>> {
    let device = cfg.capture.device.as_str();
    if device.starts_with("stub://") {
        return Ok(Box::new(SyntheticDriver::new()));
    }
    #[cfg(feature = "driver-v4l2")]
    {
        Ok(Box::new(picam_bridge::V4l2Driver::new()))
    }
    #[cfg(not(feature = "driver-v4l2"))]
    Err(anyhow!(
        "no driver for device '{device}'; rebuild with --features driver-v4l2"
    ))
}

fn run_event_loop(
    mut connection: Connection,
    client: &Client,
    set_topic: &str,
    store: CalibrationStore,
    running: &AtomicBool,
) {
    for event in connection.iter() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match event {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                // (Re)subscribe on every connect; clean-start sessions lose
                // subscriptions across reconnects.
                if let Err(err) = client.subscribe(set_topic, QoS::AtMostOnce) {
                    log::warn!("subscribe to {} failed: {}", set_topic, err);
                } else {
                    log::info!("subscribed to {}", set_topic);
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                if publish.topic.as_ref() != set_topic.as_bytes() {
                    continue;
                }
                match serde_json::from_slice::<CalibrationInfo>(&publish.payload) {
                    Ok(info) => {
                        store.replace(info);
                        log::info!("calibration record replaced via mqtt");
                    }
                    Err(err) => log::warn!("ignoring malformed calibration update: {}", err),
                }
            }
            Ok(_) => {}
            Err(err) => {
                log::error!("mqtt connection error: {}. retrying...", err);
                std::thread::sleep(Duration::from_secs(5));
            }
        }
    }
}
