//! Test helper utilities: an in-process gateway, a fake prediction
//! provider and a scripted browser.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::sleep;

use imagegen_gateway::{
    app_state::AppState,
    routes,
    services::{
        browser::{AutomationError, BrowserDriver, BrowserSettings},
        fetcher::AssetFetcher,
        generation::GenerationService,
        progress::ProgressHub,
        provider::{ProviderClient, ProviderSettings},
        queue::JobQueue,
        status::StatusStore,
        storage::LocalStore,
        throttle::AdmissionThrottle,
        worker::BrowserWorker,
    },
};

use crate::fixtures::{self, PromptFixture};

/// Serves page sources in order and keeps returning the last one.
pub struct ScriptedBrowser {
    pages: Arc<Mutex<VecDeque<String>>>,
    last: String,
}

impl ScriptedBrowser {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(pages.into())),
            last: String::new(),
        }
    }
}

#[async_trait]
impl BrowserDriver for ScriptedBrowser {
    async fn navigate(&mut self, _url: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn fill(&mut self, _selector: &str, _text: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn click(&mut self, _selector: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, AutomationError> {
        if let Some(page) = self.pages.lock().unwrap().pop_front() {
            self.last = page;
        }
        Ok(self.last.clone())
    }

    async fn reset(&mut self) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AutomationError> {
        Ok(())
    }
}

/// How the fake provider answers prediction polls.
#[derive(Debug, Clone, Copy)]
pub enum ProviderBehavior {
    /// One "processing" poll, then an output URL.
    Succeed,
    /// Never produces output.
    Stall,
    /// Reports the prediction as failed.
    Fail,
}

#[derive(Clone)]
struct FakeProvider {
    behavior: ProviderBehavior,
    base_url: String,
    polls: Arc<AtomicUsize>,
}

/// Start a fake prediction provider and return its predictions endpoint.
pub async fn spawn_provider(behavior: ProviderBehavior) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let state = FakeProvider {
        behavior,
        base_url: base_url.clone(),
        polls: Arc::new(AtomicUsize::new(0)),
    };
    let app = Router::new()
        .route("/predictions", post(create_prediction))
        .route("/predictions/{id}", get(poll_prediction))
        .route("/asset.png", get(asset))
        .with_state(state);

    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("{base_url}/predictions")
}

async fn create_prediction(Json(body): Json<Value>) -> Json<Value> {
    assert!(body["input"]["prompt"].is_string());
    Json(json!({ "id": "pred-1", "status": "starting" }))
}

async fn poll_prediction(State(state): State<FakeProvider>, Path(id): Path<String>) -> Json<Value> {
    let poll = state.polls.fetch_add(1, Ordering::SeqCst);
    let body = match state.behavior {
        ProviderBehavior::Succeed if poll > 0 => json!({
            "id": id,
            "status": "succeeded",
            "output": [format!("{}/asset.png", state.base_url)],
        }),
        ProviderBehavior::Succeed | ProviderBehavior::Stall => {
            json!({ "id": id, "status": "processing", "output": null })
        }
        ProviderBehavior::Fail => json!({
            "id": id,
            "status": "failed",
            "error": "NSFW content detected",
        }),
    };
    Json(body)
}

async fn asset() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], fixtures::PNG)
}

/// Knobs for [`spawn_app`].
pub struct AppOptions {
    pub api_key: Option<&'static str>,
    pub queue_size: usize,
    pub throttle: Duration,
    /// Predictions endpoint; enables the fast path when set.
    pub provider_url: Option<String>,
    pub provider_max_polls: u32,
    pub provider_timeout: Duration,
    pub pages: Vec<String>,
    /// Start the browser worker right away.
    pub start_worker: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            queue_size: 10,
            throttle: Duration::ZERO,
            provider_url: None,
            provider_max_polls: 20,
            provider_timeout: Duration::from_millis(500),
            pages: vec![fixtures::working_page(), fixtures::finished_page()],
            start_worker: true,
        }
    }
}

/// A gateway listening on an ephemeral port.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub storage: TempDir,
    api_key: Option<&'static str>,
    worker: Option<BrowserWorker>,
    shutdown: watch::Sender<bool>,
}

pub async fn spawn_app(options: AppOptions) -> TestApp {
    let storage = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalStore::new(storage.path()));
    let fetcher = Arc::new(AssetFetcher::new(store, Duration::from_secs(5)).unwrap());

    let provider = options.provider_url.map(|endpoint| {
        Arc::new(
            ProviderClient::new(ProviderSettings {
                endpoint,
                model: "black-forest-labs/flux-schnell".to_string(),
                poll_interval: Duration::from_millis(10),
                max_polls: options.provider_max_polls,
                timeout: options.provider_timeout,
            })
            .unwrap(),
        )
    });

    let status = Arc::new(StatusStore::new());
    let queue = Arc::new(JobQueue::new(options.queue_size));
    let generation = Arc::new(GenerationService::new(
        status.clone(),
        queue.clone(),
        AdmissionThrottle::new(options.throttle),
        provider,
        fetcher.clone(),
        ProgressHub::default(),
    ));

    let worker = BrowserWorker::new(
        Box::new(ScriptedBrowser::new(options.pages)),
        queue,
        status,
        fetcher,
        browser_settings(),
    )
    .unwrap();

    let state = AppState::new(generation, options.api_key.map(str::to_string));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, routes::router(state)).await.unwrap() });

    let (shutdown, _) = watch::channel(false);
    let mut app = TestApp {
        base_url,
        client: reqwest::Client::new(),
        storage,
        api_key: options.api_key,
        worker: Some(worker),
        shutdown,
    };
    if options.start_worker {
        app.start_worker();
    }
    app
}

fn browser_settings() -> BrowserSettings {
    BrowserSettings {
        generator_url: "https://generator.example.com/create".to_string(),
        prompt_selector: "#imagegen-input".to_string(),
        style_selector: "#lora-search-input".to_string(),
        submit_selector: "#generate-button".to_string(),
        result_selector: "img.generated-image".to_string(),
        progress_selector: ".generation-progress".to_string(),
        error_selector: ".generation-error".to_string(),
        job_timeout: Duration::from_secs(5),
        poll_initial: Duration::from_millis(5),
        poll_max: Duration::from_millis(20),
        poll_max_attempts: 20,
    }
}

impl TestApp {
    pub fn start_worker(&mut self) {
        let worker = self.worker.take().expect("worker already started");
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move { worker.run(shutdown).await });
    }

    /// GET `path`, sending the configured API key.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(key) = self.api_key {
            request = request.header("x-api-key", key);
        }
        request.send().await.unwrap()
    }

    /// Submit a prompt through `GET /generateImage`.
    pub async fn generate(&self, fixture: &PromptFixture) -> reqwest::Response {
        let mut request = self
            .client
            .get(format!("{}/generateImage", self.base_url))
            .query(&[("prompt", fixture.prompt)]);
        if let Some(style) = fixture.style {
            request = request.query(&[("loraName", style)]);
        }
        if let Some(key) = self.api_key {
            request = request.header("x-api-key", key);
        }
        request.send().await.unwrap()
    }

    /// Submit a prompt and return the image id of the accepted job.
    pub async fn submit(&self, fixture: &PromptFixture) -> String {
        let response = self.generate(fixture).await;
        assert_eq!(response.status(), 200, "{} was rejected", fixture.description);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], true);
        body["imageId"].as_str().unwrap().to_string()
    }

    pub async fn status(&self, image_id: &str) -> Value {
        let response = self.get(&format!("/status/{image_id}")).await;
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }

    /// Poll the status endpoint until the job is COMPLETED or FAILED.
    pub async fn wait_for_terminal(&self, image_id: &str, timeout_secs: u64) -> Value {
        let max_attempts = timeout_secs * 20; // Poll every 50ms

        for _ in 0..max_attempts {
            let record = self.status(image_id).await;
            match record["status"].as_str() {
                Some("COMPLETED" | "FAILED") => return record,
                Some("QUEUED" | "STARTING" | "PENDING") => sleep(Duration::from_millis(50)).await,
                other => panic!("Unknown job status: {other:?}"),
            }
        }

        panic!("Job {image_id} did not finish within {timeout_secs} seconds");
    }

    pub fn stored_image(&self, image_id: &str, ext: &str) -> std::path::PathBuf {
        self.storage.path().join(format!("images/{image_id}.{ext}"))
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
