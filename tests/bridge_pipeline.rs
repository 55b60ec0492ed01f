//! End-to-end pipeline tests: synthetic driver, recording sinks.

use std::sync::Arc;
use std::time::Duration;

use picam_bridge::calibration::CalibrationInfo;
use picam_bridge::config::BridgeConfig;
use picam_bridge::messages::{CompressedFrame, ImageFrame, Timestamp};
use picam_bridge::sink::{journal, PublishJournal, PublishRecord, PublisherSet, RecordingSink, Sink};
use picam_bridge::{CameraBridge, SyntheticDriver};

struct Bench {
    journal: PublishJournal,
    raw: Arc<RecordingSink<ImageFrame>>,
    compressed: Arc<RecordingSink<CompressedFrame>>,
    info: Arc<RecordingSink<CalibrationInfo>>,
    publishers: PublisherSet,
}

fn bench() -> Bench {
    let journal = journal();
    let raw = RecordingSink::new(journal.clone());
    let compressed = RecordingSink::new(journal.clone());
    let info = RecordingSink::new(journal.clone());
    let publishers = PublisherSet {
        raw: Some(raw.clone() as Arc<dyn Sink<ImageFrame>>),
        compressed: compressed.clone(),
        info: info.clone(),
    };
    Bench {
        journal,
        raw,
        compressed,
        info,
        publishers,
    }
}

fn test_config() -> BridgeConfig {
    let mut cfg = BridgeConfig::default();
    cfg.capture.width = 32;
    cfg.capture.height = 16;
    cfg.capture.framerate = 200;
    cfg
}

#[test]
fn every_frame_publish_is_followed_by_a_matching_info_publish() {
    let bench = bench();
    let cfg = test_config();
    let bridge =
        CameraBridge::new(Box::new(SyntheticDriver::new()), &cfg, bench.publishers.clone())
            .expect("bridge");

    std::thread::sleep(Duration::from_millis(120));
    bridge.shutdown().expect("shutdown");

    let journal = bench.journal.lock().unwrap();
    assert!(!journal.is_empty(), "no publications recorded");

    let mut frames = 0usize;
    for (i, record) in journal.iter().enumerate() {
        let stamp = match record {
            PublishRecord::Raw { stamp, .. } | PublishRecord::Compressed { stamp, .. } => *stamp,
            PublishRecord::Info { .. } => continue,
        };
        frames += 1;
        match journal.get(i + 1) {
            Some(PublishRecord::Info {
                stamp: info_stamp,
                frame_id,
            }) => {
                assert_eq!(*info_stamp, stamp, "info stamp differs at journal index {i}");
                assert_eq!(frame_id, "camera");
            }
            other => panic!("frame publish at {i} not followed by info: {other:?}"),
        }
    }
    assert!(frames > 0);
    // Both channels were active, so each logical frame produced two info
    // publications: one per frame publish.
    assert_eq!(
        bench.info.len(),
        bench.raw.len() + bench.compressed.len()
    );
}

#[test]
fn disabled_raw_transport_publishes_no_raw_frames() {
    let bench = bench();
    let mut cfg = test_config();
    cfg.capture.raw_transport = false;

    let bridge =
        CameraBridge::new(Box::new(SyntheticDriver::new()), &cfg, bench.publishers.clone())
            .expect("bridge");
    std::thread::sleep(Duration::from_millis(80));
    bridge.shutdown().expect("shutdown");

    assert!(bench.raw.is_empty());
    assert!(bench.compressed.len() > 0);
    let journal = bench.journal.lock().unwrap();
    assert!(journal
        .iter()
        .all(|r| !matches!(r, PublishRecord::Raw { .. })));
}

#[test]
fn replaced_calibration_flows_into_subsequent_info_publishes() {
    let bench = bench();
    let cfg = test_config();
    let bridge =
        CameraBridge::new(Box::new(SyntheticDriver::new()), &cfg, bench.publishers.clone())
            .expect("bridge");

    std::thread::sleep(Duration::from_millis(40));
    let replacement = CalibrationInfo {
        frame_id: "bench".to_string(),
        stamp: Timestamp::default(),
        width: 99,
        height: 77,
        k: [9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0],
    };
    assert!(bridge.set_calibration(replacement.clone()));
    std::thread::sleep(Duration::from_millis(120));
    bridge.shutdown().expect("shutdown");

    let infos = bench.info.messages();
    let last = infos.last().expect("no info publications");
    assert_eq!(last.k, replacement.k);
    assert_eq!(last.width, replacement.width);
    assert_eq!(last.height, replacement.height);
    // The snapshot restamps the record for publication.
    assert_eq!(last.frame_id, "camera");
}

#[test]
fn initial_info_publishes_carry_derived_intrinsics() {
    let bench = bench();
    let cfg = test_config();
    let bridge =
        CameraBridge::new(Box::new(SyntheticDriver::new()), &cfg, bench.publishers.clone())
            .expect("bridge");
    std::thread::sleep(Duration::from_millis(60));
    bridge.shutdown().expect("shutdown");

    let infos = bench.info.messages();
    let first = infos.first().expect("no info publications");
    assert_eq!(first.width, 32);
    assert_eq!(first.height, 16);
    assert_eq!(first.k[2], 16.0);
    assert_eq!(first.k[5], 8.0);
}

#[test]
fn rejected_configuration_aborts_bridge_construction() {
    let bench = bench();
    let mut cfg = test_config();
    cfg.capture.width = 0;
    let result = CameraBridge::new(Box::new(SyntheticDriver::new()), &cfg, bench.publishers);
    assert!(result.is_err());
    assert!(bench.journal.lock().unwrap().is_empty());
}

#[test]
fn shutdown_halts_publication() {
    let bench = bench();
    let cfg = test_config();
    let bridge =
        CameraBridge::new(Box::new(SyntheticDriver::new()), &cfg, bench.publishers.clone())
            .expect("bridge");
    std::thread::sleep(Duration::from_millis(40));
    bridge.shutdown().expect("shutdown");

    let count = bench.journal.lock().unwrap().len();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(bench.journal.lock().unwrap().len(), count);
}
