//! set_calibration - replace the calibration record of a running daemon.
//!
//! Sends a `POST /set_camera_info` request to the loopback API of
//! `picam_bridged` and prints the daemon's answer. The record comes from a
//! JSON file, an explicit matrix, or is derived from the given resolution.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use picam_bridge::calibration::{CalibrationInfo, SensorGeometry};
use picam_bridge::messages::Timestamp;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Replace the calibration record of a running picam_bridged"
)]
struct Args {
    /// Loopback API address of the daemon.
    #[arg(long, env = "PICAM_API_ADDR", default_value = "127.0.0.1:8790")]
    api_addr: String,

    /// Path to a JSON calibration record; overrides the other options.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Image width of the record.
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Image height of the record.
    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Intrinsic matrix as nine comma-separated row-major values; derived
    /// from the resolution when omitted.
    #[arg(long, value_name = "K", allow_hyphen_values = true)]
    k: Option<String>,

    /// Frame-of-reference label of the record.
    #[arg(long, default_value = "camera")]
    frame_id: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let calibration = load_record(&args)?;
    let body = serde_json::to_vec(&serde_json::json!({ "calibration": calibration }))?;

    let mut stream = TcpStream::connect(&args.api_addr)
        .with_context(|| format!("connect to daemon api at {}", args.api_addr))?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let header = format!(
        "POST /set_camera_info HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        args.api_addr,
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&body)?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let body = response.split("\r\n\r\n").nth(1).unwrap_or("").trim();
    println!("{body}");
    if body.contains(r#""success":true"#) {
        Ok(())
    } else {
        Err(anyhow!("daemon rejected calibration update"))
    }
}

fn load_record(args: &Args) -> Result<CalibrationInfo> {
    if let Some(path) = &args.file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        return serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()));
    }
    let k = match &args.k {
        Some(raw) => parse_matrix(raw)?,
        None => CalibrationInfo::from_resolution(args.width, args.height, SensorGeometry::default()).k,
    };
    Ok(CalibrationInfo {
        frame_id: args.frame_id.clone(),
        stamp: Timestamp::default(),
        width: args.width,
        height: args.height,
        k,
    })
}

fn parse_matrix(raw: &str) -> Result<[f64; 9]> {
    let values: Vec<f64> = raw
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| anyhow!("invalid matrix entry '{}'", v.trim()))
        })
        .collect::<Result<_>>()?;
    values
        .try_into()
        .map_err(|_| anyhow!("matrix needs exactly nine values"))
}
