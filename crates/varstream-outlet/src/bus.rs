//! [`StreamBus`] – in-process stream transport on Tokio broadcast channels.
//!
//! Every outlet created through the bus publishes three kinds of
//! [`BusMessage`]:
//!
//! | Message | When |
//! |---|---|
//! | [`BusMessage::StreamOpened`] | the outlet is created |
//! | [`BusMessage::Sample`] | every `push_sample` |
//! | [`BusMessage::StreamClosed`] | the outlet is dropped |
//!
//! Each outlet gets a fresh [`Uuid`], so a rebuilt stream is always a new
//! stream identity for downstream consumers even when its name and source
//! id are unchanged. The bus also remembers which streams are currently
//! open so that late subscribers (e.g. a WebSocket client that connects
//! mid-run) can learn their metadata.
//!
//! Pushing never blocks: slow subscribers lag and lose the oldest samples.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};
use uuid::Uuid;
use varstream_types::{BridgeError, Result, StreamInfo};

use crate::outlet::{OutletProvider, SampleRef, StreamOutlet};

/// Default channel capacity (messages buffered per subscriber before the
/// oldest are dropped).
const DEFAULT_CAPACITY: usize = 1024;

/// Channel values of one sample, owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleValues {
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl From<SampleRef<'_>> for SampleValues {
    fn from(sample: SampleRef<'_>) -> Self {
        match sample {
            SampleRef::Int32(v) => SampleValues::Int32(v.to_vec()),
            SampleRef::Float32(v) => SampleValues::Float32(v.to_vec()),
            SampleRef::Float64(v) => SampleValues::Float64(v.to_vec()),
        }
    }
}

/// One pushed sample as seen by bus subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFrame {
    pub uid: Uuid,
    pub name: Arc<str>,
    /// Per-stream sequence number, starting at 0.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub values: SampleValues,
}

/// Everything that travels over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusMessage {
    StreamOpened { uid: Uuid, info: Arc<StreamInfo> },
    Sample(SampleFrame),
    StreamClosed { uid: Uuid, name: String },
}

impl BusMessage {
    /// Name of the stream the message belongs to.
    pub fn stream_name(&self) -> &str {
        match self {
            BusMessage::StreamOpened { info, .. } => &info.name,
            BusMessage::Sample(frame) => &frame.name,
            BusMessage::StreamClosed { name, .. } => name,
        }
    }
}

type OpenStreams = Arc<Mutex<HashMap<Uuid, Arc<StreamInfo>>>>;

/// Shared stream bus. Clone it cheaply – all clones share the same channel
/// and the same table of open streams.
#[derive(Clone, Debug)]
pub struct StreamBus {
    sender: broadcast::Sender<BusMessage>,
    open: OpenStreams,
}

impl StreamBus {
    /// Create a bus whose subscribers buffer up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            open: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to every message published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    /// Publish `message`, returning the number of subscribers that got it.
    /// Publishing without subscribers is normal and returns `0`.
    pub fn publish(&self, message: BusMessage) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    /// Announcements for every stream that is currently open.
    pub fn open_streams(&self) -> Vec<BusMessage> {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(uid, info)| BusMessage::StreamOpened {
                uid: *uid,
                info: Arc::clone(info),
            })
            .collect()
    }
}

impl Default for StreamBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl OutletProvider for StreamBus {
    fn create_outlet(&self, info: StreamInfo) -> Result<Box<dyn StreamOutlet>> {
        if info.name.is_empty() {
            return Err(BridgeError::Outlet("stream name must not be empty".to_string()));
        }
        if !(info.nominal_srate.is_finite() && info.nominal_srate >= 0.0) {
            return Err(BridgeError::Outlet(format!(
                "stream \"{}\": invalid nominal rate {}",
                info.name, info.nominal_srate
            )));
        }

        let uid = Uuid::new_v4();
        let info = Arc::new(info);
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uid, Arc::clone(&info));
        info!(
            stream = %info.name,
            %uid,
            type_label = %info.type_label,
            channels = info.channel_count,
            srate = info.nominal_srate,
            source_id = %info.source_id,
            "stream opened"
        );
        self.publish(BusMessage::StreamOpened {
            uid,
            info: Arc::clone(&info),
        });

        Ok(Box::new(BusOutlet {
            uid,
            name: Arc::from(info.name.as_str()),
            info,
            seq: 0,
            sender: self.sender.clone(),
            open: Arc::clone(&self.open),
        }))
    }
}

struct BusOutlet {
    uid: Uuid,
    name: Arc<str>,
    info: Arc<StreamInfo>,
    seq: u64,
    sender: broadcast::Sender<BusMessage>,
    open: OpenStreams,
}

impl StreamOutlet for BusOutlet {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn push_sample(&mut self, sample: SampleRef<'_>) {
        debug_assert_eq!(sample.len(), self.info.channel_count as usize);
        let frame = SampleFrame {
            uid: self.uid,
            name: Arc::clone(&self.name),
            seq: self.seq,
            timestamp: Utc::now(),
            values: sample.into(),
        };
        self.seq += 1;
        if self.sender.send(BusMessage::Sample(frame)).is_err() {
            trace!(stream = %self.name, "sample dropped, no subscribers");
        }
    }
}

impl Drop for BusOutlet {
    fn drop(&mut self) {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.uid);
        debug!(stream = %self.name, uid = %self.uid, samples = self.seq, "stream closed");
        let _ = self.sender.send(BusMessage::StreamClosed {
            uid: self.uid,
            name: self.info.name.clone(),
        });
    }
}
