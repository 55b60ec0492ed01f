//! Publication sinks.
//!
//! Sinks are the outbound boundary of the bridge. The dispatcher hands each
//! finished message to a sink and moves on; delivery reliability is the
//! sink's concern. A rejected message is logged by the caller and dropped,
//! never retried.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::calibration::CalibrationInfo;
use crate::messages::{CompressedFrame, ImageFrame, Timestamp};

/// An outbound channel for one message type.
pub trait Sink<M>: Send + Sync {
    fn publish(&self, msg: M) -> Result<()>;
}

/// Adapter turning a closure into a [`Sink`].
pub struct FnSink<F>(pub F);

impl<M, F> Sink<M> for FnSink<F>
where
    F: Fn(M) -> Result<()> + Send + Sync,
{
    fn publish(&self, msg: M) -> Result<()> {
        (self.0)(msg)
    }
}

/// The sinks a bridge publishes to. Raw publication is optional; the
/// compressed and camera-info channels are always present.
#[derive(Clone)]
pub struct PublisherSet {
    pub raw: Option<Arc<dyn Sink<ImageFrame>>>,
    pub compressed: Arc<dyn Sink<CompressedFrame>>,
    pub info: Arc<dyn Sink<CalibrationInfo>>,
}

/// One entry in the publication journal, in publish order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishRecord {
    Raw { frame_id: String, stamp: Timestamp },
    Compressed { frame_id: String, stamp: Timestamp },
    Info { frame_id: String, stamp: Timestamp },
}

impl PublishRecord {
    pub fn stamp(&self) -> Timestamp {
        match self {
            Self::Raw { stamp, .. } | Self::Compressed { stamp, .. } | Self::Info { stamp, .. } => {
                *stamp
            }
        }
    }
}

/// Ordered journal shared by a set of [`RecordingSink`]s, so cross-sink
/// publish order can be asserted.
pub type PublishJournal = Arc<Mutex<Vec<PublishRecord>>>;

/// Fresh empty journal.
pub fn journal() -> PublishJournal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Message types a [`RecordingSink`] knows how to journal.
pub trait Recorded {
    fn entry(&self) -> PublishRecord;
}

impl Recorded for ImageFrame {
    fn entry(&self) -> PublishRecord {
        PublishRecord::Raw {
            frame_id: self.frame_id.clone(),
            stamp: self.stamp,
        }
    }
}

impl Recorded for CompressedFrame {
    fn entry(&self) -> PublishRecord {
        PublishRecord::Compressed {
            frame_id: self.frame_id.clone(),
            stamp: self.stamp,
        }
    }
}

impl Recorded for CalibrationInfo {
    fn entry(&self) -> PublishRecord {
        PublishRecord::Info {
            frame_id: self.frame_id.clone(),
            stamp: self.stamp,
        }
    }
}

/// In-memory sink for benches and tests: keeps every message it receives
/// and appends to a shared journal.
pub struct RecordingSink<M> {
    messages: Mutex<Vec<M>>,
    journal: PublishJournal,
    failing: AtomicBool,
}

impl<M> RecordingSink<M> {
    pub fn new(journal: PublishJournal) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
            journal,
            failing: AtomicBool::new(false),
        })
    }

    /// Make subsequent publishes fail, to exercise the drop-on-failure path.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn messages(&self) -> Vec<M>
    where
        M: Clone,
    {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl<M: Recorded + Send> Sink<M> for RecordingSink<M> {
    fn publish(&self, msg: M) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("sink rejected message"));
        }
        self.journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(msg.entry());
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(msg);
        Ok(())
    }
}
