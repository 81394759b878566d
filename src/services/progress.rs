//! Per-job progress notifications.
//!
//! Every [`Job`](crate::models::job::Job) carries a clone of the
//! [`ProgressHub`]. Pipelines publish [`JobEvent`]s on it and transport
//! layers (the SSE route) subscribe and filter on the image id. Neither the
//! queue nor the worker knows who, if anyone, is listening.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::job::JobStatus;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// A progress notification for a single job.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub image_id: String,
    #[serde(flatten)]
    pub kind: JobEventKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobEventKind {
    /// The status record changed.
    #[serde(rename = "status:update")]
    StatusUpdate {
        status: JobStatus,
        error: Option<String>,
    },

    /// The generator page shows a new intermediate image.
    #[serde(rename = "preview:update")]
    PreviewUpdate { url: String },
}

impl JobEvent {
    pub fn new(image_id: impl Into<String>, kind: JobEventKind) -> Self {
        Self {
            image_id: image_id.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self.kind {
            JobEventKind::StatusUpdate { .. } => "status:update",
            JobEventKind::PreviewUpdate { .. } => "preview:update",
        }
    }

    /// Whether this is the last event a job will ever publish.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, JobEventKind::StatusUpdate { status, .. } if status.is_terminal())
    }
}

/// Fan-out channel shared by all jobs.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    sender: broadcast::Sender<JobEvent>,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Dropped silently when nobody is subscribed.
    pub fn emit(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
