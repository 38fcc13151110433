// src/sink.rs
//! Render events out of the pipeline and control commands back into it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::merge::EnrichedRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Loading,
    Paused,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct RenderSnapshot {
    pub records: Vec<EnrichedRecord>,
    pub status: Status,
    pub progress: Progress,
    pub rendered_at: DateTime<Utc>,
}

/// Called after every merge and every state transition. Must not block.
pub trait RenderSink: Send + Sync {
    fn render(&self, snapshot: &RenderSnapshot);
}

/// Forwards frames to a channel; the receiving side does the drawing.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RenderSnapshot>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RenderSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RenderSink for ChannelSink {
    fn render(&self, snapshot: &RenderSnapshot) {
        // Receiver gone means nobody is watching anymore.
        let _ = self.tx.send(snapshot.clone());
    }
}

/// Logs status and progress only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl RenderSink for LogSink {
    fn render(&self, snapshot: &RenderSnapshot) {
        tracing::info!(
            target: "enrich",
            status = ?snapshot.status,
            done = snapshot.progress.done,
            total = snapshot.progress.total,
            records = snapshot.records.len(),
            "render"
        );
    }
}

// --- Test helper ---
pub struct RecordingSink {
    pub frames: Mutex<Vec<RenderSnapshot>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(vec![]),
        }
    }

    pub fn last(&self) -> Option<RenderSnapshot> {
        self.frames
            .lock()
            .expect("recording sink mutex poisoned")
            .last()
            .cloned()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSink for RecordingSink {
    fn render(&self, snapshot: &RenderSnapshot) {
        self.frames
            .lock()
            .expect("recording sink mutex poisoned")
            .push(snapshot.clone());
    }
}

/// What a renderer may send back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Toggle,
    Pause,
    Resume,
}

impl ControlCommand {
    /// `p`/`toggle`, `pause`, `resume`/`r` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p" | "t" | "toggle" => Some(Self::Toggle),
            "pause" => Some(Self::Pause),
            "r" | "resume" => Some(Self::Resume),
            _ => None,
        }
    }
}
