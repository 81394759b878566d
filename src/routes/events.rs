use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

use crate::app_state::AppState;
use crate::models::job::StatusRecord;
use crate::routes::error::ApiError;
use crate::services::progress::{JobEvent, JobEventKind};
use crate::services::status::StatusStore;

struct Cursor {
    image_id: String,
    pending: Option<JobEvent>,
    receiver: Receiver<JobEvent>,
    status: Arc<StatusStore>,
    finished: bool,
}

/// GET /events/{image_id}: Server-Sent Events for one job.
///
/// Starts with the current status, then forwards the job's status and
/// preview updates. The stream ends after the terminal status.
pub async fn job_events(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    // Subscribe before reading the record so no update falls in between.
    let receiver = state.generation.subscribe();
    let record = state.generation.status(&image_id).ok_or(ApiError::NotFound)?;

    let cursor = Cursor {
        pending: Some(status_event(record)),
        image_id,
        receiver,
        status: state.generation.status_store(),
        finished: false,
    };

    let events = stream::unfold(cursor, next_event)
        .map(|event| Event::default().event(event.name()).json_data(&event));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn status_event(record: StatusRecord) -> JobEvent {
    JobEvent::new(
        record.image_id,
        JobEventKind::StatusUpdate {
            status: record.status,
            error: record.error,
        },
    )
}

async fn next_event(mut cursor: Cursor) -> Option<(JobEvent, Cursor)> {
    if cursor.finished {
        return None;
    }

    let event = match cursor.pending.take() {
        Some(event) => event,
        None => loop {
            match cursor.receiver.recv().await {
                Ok(event) if event.image_id == cursor.image_id => break event,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(image_id = %cursor.image_id, skipped, "Event subscriber lagged");
                    // The terminal update may have been among the skipped events.
                    match cursor.status.get(&cursor.image_id) {
                        Some(record) if record.status.is_terminal() => break status_event(record),
                        _ => continue,
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        },
    };

    cursor.finished = event.is_terminal();
    Some((event, cursor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobStatus;
    use crate::services::progress::ProgressHub;
    use std::time::Duration;

    fn cursor(hub: &ProgressHub, status: Arc<StatusStore>, image_id: &str) -> Cursor {
        Cursor {
            image_id: image_id.to_string(),
            pending: None,
            receiver: hub.subscribe(),
            status,
            finished: false,
        }
    }

    fn preview(image_id: String) -> JobEvent {
        JobEvent::new(
            image_id,
            JobEventKind::PreviewUpdate {
                url: "https://generator.example.com/p.jpg".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_forwards_only_own_events_and_stops_after_terminal() {
        let hub = ProgressHub::default();
        let status = Arc::new(StatusStore::new());
        let cursor = cursor(&hub, status, "mine");

        hub.emit(preview("other".to_string()));
        hub.emit(preview("mine".to_string()));
        hub.emit(JobEvent::new(
            "mine",
            JobEventKind::StatusUpdate {
                status: JobStatus::Completed,
                error: None,
            },
        ));

        let (first, cursor) = next_event(cursor).await.unwrap();
        assert_eq!(first.name(), "preview:update");
        assert_eq!(first.image_id, "mine");

        let (second, cursor) = next_event(cursor).await.unwrap();
        assert!(second.is_terminal());

        assert!(next_event(cursor).await.is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_still_sees_terminal_status() {
        let hub = ProgressHub::default();
        let status = Arc::new(StatusStore::new());
        let cursor = cursor(&hub, status.clone(), "mine");

        status.update("mine", JobStatus::Completed, None);
        hub.emit(JobEvent::new(
            "mine",
            JobEventKind::StatusUpdate {
                status: JobStatus::Completed,
                error: None,
            },
        ));
        for i in 0..300 {
            hub.emit(preview(format!("other-{i}")));
        }

        let (event, cursor) = tokio::time::timeout(Duration::from_secs(1), next_event(cursor))
            .await
            .expect("stream hung after lagging")
            .unwrap();
        assert_eq!(event.image_id, "mine");
        assert!(matches!(
            event.kind,
            JobEventKind::StatusUpdate {
                status: JobStatus::Completed,
                ..
            }
        ));
        assert!(next_event(cursor).await.is_none());
    }
}
