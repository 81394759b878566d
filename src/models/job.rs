use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::services::progress::ProgressHub;

/// Lifecycle status of a generation job.
///
/// Serialized in SCREAMING case (`"QUEUED"`), which is what polling clients
/// of the status endpoint expect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Starting,
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    /// Position along the lifecycle. A record only ever moves to an equal or
    /// higher stage, and never leaves a terminal one.
    fn stage(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Starting => 1,
            JobStatus::Pending => 2,
            JobStatus::Completed | JobStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a record currently in `self` may be overwritten with `next`.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.stage() >= self.stage()
    }
}

/// Current lifecycle state of one image, as returned by `GET /status/{imageId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub image_id: String,
    pub status: JobStatus,
    pub last_modified_date: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// One admitted generation request.
///
/// A job never holds a transport handle. Observers subscribe to the
/// [`ProgressHub`] it carries and filter on `image_id`.
#[derive(Debug, Clone)]
pub struct Job {
    pub image_id: String,
    pub prompt: String,
    pub style: Option<String>,
    pub progress: ProgressHub,
}

impl Job {
    pub fn new(prompt: String, style: Option<String>, progress: ProgressHub) -> Self {
        Self {
            image_id: Uuid::new_v4().to_string(),
            prompt,
            style,
            progress,
        }
    }
}

/// Projection of a job kept next to it on the queue for introspection.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobSummary {
    pub prompt: String,
    pub style: Option<String>,
}

/// Unit of work on the job queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: String,
    pub data: JobSummary,
    pub job: Job,
}

impl From<Job> for QueueItem {
    fn from(job: Job) -> Self {
        Self {
            id: job.image_id.clone(),
            data: JobSummary {
                prompt: job.prompt.clone(),
                style: job.style.clone(),
            },
            job,
        }
    }
}
