use std::time::Duration;

use serde::Deserialize;

use crate::services::browser::BrowserSettings;
use crate::services::provider::ProviderSettings;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Expected `x-api-key` header value. Authentication is off when unset.
    pub api_key: Option<String>,

    /// Maximum number of jobs waiting for the browser worker.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Minimum spacing between admitted generation requests. 0 disables it.
    #[serde(default = "default_throttle_interval_ms")]
    pub throttle_interval_ms: u64,

    /// Send unstyled prompts straight to the prediction provider.
    #[serde(default)]
    pub fooocus_enabled: bool,

    #[serde(default = "default_provider_url")]
    pub provider_url: String,

    #[serde(default = "default_provider_model")]
    pub provider_model: String,

    #[serde(default = "default_provider_poll_interval_ms")]
    pub provider_poll_interval_ms: u64,

    #[serde(default = "default_provider_max_polls")]
    pub provider_max_polls: u32,

    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// WebDriver endpoint (chromedriver) for the browser worker.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_true")]
    pub browser_headless: bool,

    /// Page the worker loads to generate an image.
    #[serde(default = "default_generator_url")]
    pub generator_url: String,

    #[serde(default = "default_prompt_selector")]
    pub prompt_selector: String,

    #[serde(default = "default_style_selector")]
    pub style_selector: String,

    #[serde(default = "default_submit_selector")]
    pub submit_selector: String,

    #[serde(default = "default_result_selector")]
    pub result_selector: String,

    #[serde(default = "default_progress_selector")]
    pub progress_selector: String,

    #[serde(default = "default_error_selector")]
    pub error_selector: String,

    #[serde(default = "default_browser_job_timeout_secs")]
    pub browser_job_timeout_secs: u64,

    #[serde(default = "default_browser_poll_max_attempts")]
    pub browser_poll_max_attempts: u32,

    /// Directory for generated images when R2 is not configured.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// R2 bucket name
    pub r2_bucket: Option<String>,

    /// R2 endpoint URL
    pub r2_endpoint: Option<String>,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: Option<String>,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: Option<String>,
}

/// Credentials for the R2 asset store.
pub struct R2Settings<'a> {
    pub bucket: &'a str,
    pub endpoint: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_queue_size() -> usize {
    10
}

fn default_throttle_interval_ms() -> u64 {
    100
}

fn default_provider_url() -> String {
    "https://fooocus.one/api/predictions".to_string()
}

fn default_provider_model() -> String {
    "black-forest-labs/flux-schnell".to_string()
}

fn default_provider_poll_interval_ms() -> u64 {
    200
}

fn default_provider_max_polls() -> u32 {
    300
}

fn default_provider_timeout_secs() -> u64 {
    60
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_true() -> bool {
    true
}

fn default_generator_url() -> String {
    "https://www.weights.com/create".to_string()
}

fn default_prompt_selector() -> String {
    "#imagegen-input".to_string()
}

fn default_style_selector() -> String {
    "#lora-search-input".to_string()
}

fn default_submit_selector() -> String {
    "#generate-button".to_string()
}

fn default_result_selector() -> String {
    "img.generated-image".to_string()
}

fn default_progress_selector() -> String {
    ".generation-progress".to_string()
}

fn default_error_selector() -> String {
    ".generation-error".to_string()
}

fn default_browser_job_timeout_secs() -> u64 {
    180
}

fn default_browser_poll_max_attempts() -> u32 {
    60
}

fn default_storage_dir() -> String {
    "./images".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    /// Provider settings, or `None` when the fast path is disabled.
    pub fn provider_settings(&self) -> Option<ProviderSettings> {
        self.fooocus_enabled.then(|| ProviderSettings {
            endpoint: self.provider_url.clone(),
            model: self.provider_model.clone(),
            poll_interval: Duration::from_millis(self.provider_poll_interval_ms),
            max_polls: self.provider_max_polls,
            timeout: Duration::from_secs(self.provider_timeout_secs),
        })
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            generator_url: self.generator_url.clone(),
            prompt_selector: self.prompt_selector.clone(),
            style_selector: self.style_selector.clone(),
            submit_selector: self.submit_selector.clone(),
            result_selector: self.result_selector.clone(),
            progress_selector: self.progress_selector.clone(),
            error_selector: self.error_selector.clone(),
            job_timeout: Duration::from_secs(self.browser_job_timeout_secs),
            poll_initial: Duration::from_millis(500),
            poll_max: Duration::from_secs(5),
            poll_max_attempts: self.browser_poll_max_attempts,
        }
    }

    /// R2 settings when all four values are present.
    pub fn r2_settings(&self) -> Option<R2Settings<'_>> {
        Some(R2Settings {
            bucket: self.r2_bucket.as_deref()?,
            endpoint: self.r2_endpoint.as_deref()?,
            access_key: self.r2_access_key.as_deref()?,
            secret_key: self.r2_secret_key.as_deref()?,
        })
    }
}
