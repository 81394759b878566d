//! Admission and routing of generation requests.
//!
//! [`GenerationService::submit`] validates a request, applies the queue's
//! backpressure and the admission throttle, and then either runs the provider
//! fast path to completion or hands the job to the browser worker.

use std::sync::Arc;
use std::time::Instant;

use garde::Validate;

use crate::models::generation::GenerateRequest;
use crate::models::job::{Job, JobStatus, QueueItem, StatusRecord};
use crate::services::fetcher::{AssetFetcher, DownloadError, StoredAsset};
use crate::services::progress::{JobEvent, ProgressHub};
use crate::services::provider::{ProviderClient, ProviderError};
use crate::services::queue::{JobQueue, QueueError};
use crate::services::status::StatusStore;
use crate::services::throttle::{AdmissionThrottle, ThrottleError};

/// Which pipeline a request goes to.
pub enum Route {
    /// No style requested and the provider is configured.
    Provider(Arc<ProviderClient>),
    /// A named style was requested, or the fast path is off.
    Browser,
}

/// Outcome of an accepted request.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Generated synchronously by the provider and already stored.
    Completed { image_id: String, asset: StoredAsset },
    /// Waiting for the browser worker.
    Queued { image_id: String },
}

impl Submission {
    pub fn image_id(&self) -> &str {
        match self {
            Submission::Completed { image_id, .. } | Submission::Queued { image_id } => image_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FastPathError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Download(#[from] DownloadError),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Invalid request: {0}")]
    Validation(garde::Report),

    #[error(transparent)]
    RateLimited(#[from] ThrottleError),

    #[error(transparent)]
    Capacity(#[from] QueueError),

    #[error("Generation of {image_id} failed: {source}")]
    Generation {
        image_id: String,
        #[source]
        source: FastPathError,
    },
}

/// Entry point for generation requests and status lookups.
pub struct GenerationService {
    status: Arc<StatusStore>,
    queue: Arc<JobQueue>,
    throttle: AdmissionThrottle,
    provider: Option<Arc<ProviderClient>>,
    fetcher: Arc<AssetFetcher>,
    progress: ProgressHub,
}

impl GenerationService {
    pub fn new(
        status: Arc<StatusStore>,
        queue: Arc<JobQueue>,
        throttle: AdmissionThrottle,
        provider: Option<Arc<ProviderClient>>,
        fetcher: Arc<AssetFetcher>,
        progress: ProgressHub,
    ) -> Self {
        Self {
            status,
            queue,
            throttle,
            provider,
            fetcher,
            progress,
        }
    }

    /// Pick the pipeline for a request.
    pub fn route(&self, style: Option<&str>) -> Route {
        match (style, &self.provider) {
            (None, Some(provider)) => Route::Provider(provider.clone()),
            _ => Route::Browser,
        }
    }

    pub async fn submit(&self, request: GenerateRequest) -> Result<Submission, SubmitError> {
        if let Err(report) = request.validate() {
            reject("validation");
            return Err(SubmitError::Validation(report));
        }
        let (prompt, style) = request.into_parts();

        // Capacity first: a request turned away for capacity must not take
        // the throttle slot.
        if self.queue.is_full() {
            reject("capacity");
            return Err(QueueError::Full {
                capacity: self.queue.capacity(),
            }
            .into());
        }

        if let Err(e) = self.throttle.try_admit() {
            reject("throttled");
            return Err(e.into());
        }

        let route = self.route(style.as_deref());
        let job = Job::new(prompt, style, self.progress.clone());

        match route {
            Route::Provider(provider) => {
                metrics::counter!("generation_requests_total", "route" => "provider").increment(1);
                self.run_fast_path(&provider, job).await
            }
            Route::Browser => {
                metrics::counter!("generation_requests_total", "route" => "browser").increment(1);
                self.enqueue(job)
            }
        }
    }

    fn enqueue(&self, job: Job) -> Result<Submission, SubmitError> {
        let image_id = job.image_id.clone();
        let item = QueueItem::from(job.clone());

        if let Err(e) = self.queue.enqueue(item) {
            reject("capacity");
            return Err(e.into());
        }
        // The worker may already have picked the job up; a late QUEUED is
        // then ignored by the store.
        self.status.record(&job, JobStatus::Queued, None);

        tracing::info!(image_id = %image_id, depth = self.queue.size(), "Job queued for browser worker");
        Ok(Submission::Queued { image_id })
    }

    async fn run_fast_path(
        &self,
        provider: &ProviderClient,
        job: Job,
    ) -> Result<Submission, SubmitError> {
        let started = Instant::now();
        self.status.record(&job, JobStatus::Starting, None);

        let outcome = async {
            let prediction_id = provider.submit(&job.prompt).await?;
            self.status.record(&job, JobStatus::Pending, None);
            tracing::info!(image_id = %job.image_id, prediction_id = %prediction_id, "Provider prediction started");

            let url = provider.wait_for_output(&prediction_id).await?;
            Ok::<StoredAsset, FastPathError>(self.fetcher.fetch(&url, &job.image_id).await?)
        }
        .await;

        metrics::histogram!("generation_job_seconds", "route" => "provider")
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(asset) => {
                self.status.record(&job, JobStatus::Completed, None);
                metrics::counter!("generation_jobs_completed_total", "route" => "provider")
                    .increment(1);
                tracing::info!(image_id = %job.image_id, key = %asset.key, "Provider job completed");
                Ok(Submission::Completed {
                    image_id: job.image_id,
                    asset,
                })
            }
            Err(e) => {
                self.status
                    .record(&job, JobStatus::Failed, Some(e.to_string()));
                metrics::counter!("generation_jobs_failed_total", "route" => "provider")
                    .increment(1);
                tracing::error!(image_id = %job.image_id, error = %e, "Provider job failed");
                Err(SubmitError::Generation {
                    image_id: job.image_id,
                    source: e,
                })
            }
        }
    }

    pub fn status(&self, image_id: &str) -> Option<StatusRecord> {
        self.status.get(image_id)
    }

    pub fn status_store(&self) -> Arc<StatusStore> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.progress.subscribe()
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn tracked_jobs(&self) -> usize {
        self.status.len()
    }

    pub fn fast_path_enabled(&self) -> bool {
        self.provider.is_some()
    }
}

fn reject(reason: &'static str) {
    metrics::counter!("generation_requests_rejected_total", "reason" => reason).increment(1);
}
