use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;

use crate::models::job::{Job, JobStatus, StatusRecord};
use crate::services::progress::{JobEvent, JobEventKind};

/// In-memory map from image id to its lifecycle record.
///
/// Records are never removed while the process runs. Updates that would move
/// a record backwards, or out of a terminal state, are ignored and logged.
#[derive(Default)]
pub struct StatusStore {
    records: RwLock<HashMap<String, StatusRecord>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or advance the record for `image_id`.
    ///
    /// Returns `false` when the update was rejected by the transition rules.
    pub fn update(&self, image_id: &str, status: JobStatus, error: Option<String>) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = records.get(image_id) {
            if !current.status.can_advance_to(status) {
                if current.status.is_terminal() {
                    tracing::warn!(
                        image_id,
                        current = %current.status,
                        rejected = %status,
                        "Ignoring status update for finished job"
                    );
                } else {
                    tracing::debug!(
                        image_id,
                        current = %current.status,
                        rejected = %status,
                        "Ignoring backwards status update"
                    );
                }
                return false;
            }
        }

        records.insert(
            image_id.to_string(),
            StatusRecord {
                image_id: image_id.to_string(),
                status,
                last_modified_date: Some(Utc::now()),
                error,
            },
        );
        true
    }

    /// Update the record for `job` and, if applied, notify the job's observers.
    pub fn record(&self, job: &Job, status: JobStatus, error: Option<String>) -> bool {
        let applied = self.update(&job.image_id, status, error.clone());
        if applied {
            job.progress.emit(JobEvent::new(
                job.image_id.clone(),
                JobEventKind::StatusUpdate { status, error },
            ));
        }
        applied
    }

    pub fn get(&self, image_id: &str) -> Option<StatusRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(image_id)
            .cloned()
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
