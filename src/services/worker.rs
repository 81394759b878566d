use std::sync::Arc;
use std::time::Instant;

use reqwest::Url;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, timeout};

use crate::models::job::{Job, JobStatus, QueueItem};
use crate::services::browser::{
    AutomationError, BrowserDriver, BrowserSettings, PageSelectors, PageState,
};
use crate::services::fetcher::{AssetFetcher, DownloadError, StoredAsset};
use crate::services::progress::{JobEvent, JobEventKind};
use crate::services::queue::JobQueue;
use crate::services::status::StatusStore;

/// Drains the job queue through the single browser session.
///
/// The session lives behind a one-slot mutex, so two jobs can never drive
/// the page at the same time even if more than one task calls [`process`].
///
/// [`process`]: BrowserWorker::process
pub struct BrowserWorker {
    session: Mutex<Box<dyn BrowserDriver>>,
    queue: Arc<JobQueue>,
    status: Arc<StatusStore>,
    fetcher: Arc<AssetFetcher>,
    selectors: PageSelectors,
    settings: BrowserSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Automation(#[from] AutomationError),

    #[error(transparent)]
    Download(#[from] DownloadError),
}

impl BrowserWorker {
    pub fn new(
        driver: Box<dyn BrowserDriver>,
        queue: Arc<JobQueue>,
        status: Arc<StatusStore>,
        fetcher: Arc<AssetFetcher>,
        settings: BrowserSettings,
    ) -> Result<Self, AutomationError> {
        let selectors = PageSelectors::parse(&settings)?;
        Ok(Self {
            session: Mutex::new(driver),
            queue,
            status,
            fetcher,
            selectors,
            settings,
        })
    }

    /// Process queued jobs until `shutdown` flips to `true`.
    ///
    /// A job that is already running is finished before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Browser worker ready, waiting for jobs");

        loop {
            let item = tokio::select! {
                item = self.queue.next() => item,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };
            self.process(item).await;
        }

        if let Err(e) = self.session.lock().await.close().await {
            tracing::warn!(error = %e, "Failed to close browser session");
        }
        tracing::info!("Browser worker stopped");
    }

    /// Run one job to a terminal status. Never fails; errors end up in the
    /// job's status record.
    pub async fn process(&self, item: QueueItem) {
        let job = item.job;
        let started = Instant::now();
        tracing::info!(
            image_id = %job.image_id,
            style = job.style.as_deref().unwrap_or("-"),
            "Processing browser job"
        );

        match self.run_job(&job).await {
            Ok(asset) => {
                self.status.record(&job, JobStatus::Completed, None);
                metrics::counter!("generation_jobs_completed_total", "route" => "browser")
                    .increment(1);
                tracing::info!(
                    image_id = %job.image_id,
                    key = %asset.key,
                    duration_secs = started.elapsed().as_secs_f64(),
                    "Browser job completed"
                );
            }
            Err(e) => {
                self.status
                    .record(&job, JobStatus::Failed, Some(e.to_string()));
                metrics::counter!("generation_jobs_failed_total", "route" => "browser")
                    .increment(1);
                tracing::error!(image_id = %job.image_id, error = %e, "Browser job failed");
            }
        }

        metrics::histogram!("generation_job_seconds", "route" => "browser")
            .record(started.elapsed().as_secs_f64());
    }

    async fn run_job(&self, job: &Job) -> Result<StoredAsset, JobError> {
        let url = {
            let mut session = self.session.lock().await;
            self.status.record(job, JobStatus::Starting, None);

            let outcome = match timeout(self.settings.job_timeout, self.drive(&mut **session, job)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(AutomationError::Timeout(self.settings.job_timeout)),
            };

            if outcome.is_err() {
                if let Err(e) = session.reset().await {
                    tracing::warn!(image_id = %job.image_id, error = %e, "Browser session reset failed");
                }
            }
            outcome?
        };

        Ok(self.fetcher.fetch(&url, &job.image_id).await?)
    }

    /// Drive the generator page for one job and return the absolute result URL.
    async fn drive(
        &self,
        driver: &mut dyn BrowserDriver,
        job: &Job,
    ) -> Result<String, AutomationError> {
        let s = &self.settings;

        driver.navigate(&s.generator_url).await?;
        driver.fill(&s.prompt_selector, &job.prompt).await?;
        if let Some(style) = &job.style {
            driver.fill(&s.style_selector, style).await?;
        }
        driver.click(&s.submit_selector).await?;
        self.status.record(job, JobStatus::Pending, None);

        let src = self.wait_for_result(driver, job).await?;
        self.resolve(&src)
    }

    /// Poll the page with exponential backoff until a final image appears.
    async fn wait_for_result(
        &self,
        driver: &mut dyn BrowserDriver,
        job: &Job,
    ) -> Result<String, AutomationError> {
        let mut delay = self.settings.poll_initial;
        let mut last_preview: Option<String> = None;

        for attempt in 1..=self.settings.poll_max_attempts {
            let html = driver.page_source().await?;
            match self.selectors.inspect(&html) {
                PageState::Ready { src } => return Ok(src),
                PageState::Failed { message } => return Err(AutomationError::Generation(message)),
                PageState::Working { preview } => {
                    if let Some(preview) = preview.filter(|p| last_preview.as_ref() != Some(p)) {
                        if let Ok(url) = self.resolve(&preview) {
                            job.progress.emit(JobEvent::new(
                                job.image_id.clone(),
                                JobEventKind::PreviewUpdate { url },
                            ));
                        }
                        last_preview = Some(preview);
                    }
                }
            }

            tracing::trace!(image_id = %job.image_id, attempt, "Result not ready");
            sleep(delay).await;
            delay = (delay * 2).min(self.settings.poll_max);
        }

        Err(AutomationError::PollExhausted {
            attempts: self.settings.poll_max_attempts,
        })
    }

    /// Resolve a possibly relative image reference against the generator URL.
    fn resolve(&self, src: &str) -> Result<String, AutomationError> {
        Url::parse(&self.settings.generator_url)
            .and_then(|base| base.join(src))
            .map(String::from)
            .map_err(|_| AutomationError::ResultUrl(src.to_string()))
    }
}
