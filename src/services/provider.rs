//! Client for a Replicate-style prediction API.
//!
//! Generation is a two-step protocol: `POST {endpoint}` creates a
//! prediction, then `GET {endpoint}/{id}` is polled until the prediction
//! lists an output URL. Polling is bounded both by attempt count and by a
//! wall-clock deadline.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};

/// Plain settings for the provider fast path.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Predictions collection URL, e.g. `https://fooocus.one/api/predictions`.
    pub endpoint: String,
    pub model: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
    /// Deadline for the whole poll phase, also used as the HTTP timeout.
    pub timeout: Duration,
}

/// Client for the external generation provider.
pub struct ProviderClient {
    http: reqwest::Client,
    settings: ProviderSettings,
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    model: &'a str,
    input: PredictionInput<'a>,
}

/// Fixed generation parameters sent with every prediction.
#[derive(Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    go_fast: bool,
    megapixels: &'static str,
    num_outputs: u32,
    aspect_ratio: &'static str,
    output_format: &'static str,
    output_quality: u32,
    num_inference_steps: u32,
    disable_safety_checker: bool,
}

impl<'a> PredictionInput<'a> {
    fn for_prompt(prompt: &'a str) -> Self {
        Self {
            prompt,
            go_fast: true,
            megapixels: "0.25",
            num_outputs: 1,
            aspect_ratio: "1:1",
            output_format: "webp",
            output_quality: 100,
            num_inference_steps: 4,
            disable_safety_checker: true,
        }
    }
}

/// A prediction as reported by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Option<PredictionOutput>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Many(Vec<String>),
    One(String),
}

impl Prediction {
    /// First output URL, if the prediction has produced one.
    pub fn output_url(&self) -> Option<&str> {
        let url = match self.output.as_ref()? {
            PredictionOutput::Many(urls) => urls.first().map(String::as_str),
            PredictionOutput::One(url) => Some(url.as_str()),
        };
        url.filter(|url| !url.is_empty())
    }

    fn has_failed(&self) -> bool {
        matches!(self.status.as_deref(), Some("failed" | "canceled"))
    }
}

impl ProviderClient {
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Create a prediction for `prompt` and return its id.
    pub async fn submit(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = PredictionRequest {
            model: &self.settings.model,
            input: PredictionInput::for_prompt(prompt),
        };

        let response = self
            .http
            .post(&self.settings.endpoint)
            .json(&request)
            .send()
            .await?;

        let prediction: Prediction = Self::parse_response(response).await?;
        tracing::debug!(prediction_id = %prediction.id, "Prediction submitted");
        Ok(prediction.id)
    }

    /// Fetch the current state of a prediction.
    pub async fn prediction(&self, prediction_id: &str) -> Result<Prediction, ProviderError> {
        let response = self
            .http
            .get(format!(
                "{}/{}",
                self.settings.endpoint.trim_end_matches('/'),
                prediction_id
            ))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Poll until the prediction has an output URL.
    ///
    /// Fails with [`ProviderError::Timeout`] once `max_polls` polls came back
    /// empty or the deadline passed, whichever happens first.
    pub async fn wait_for_output(&self, prediction_id: &str) -> Result<String, ProviderError> {
        match timeout(self.settings.timeout, self.poll_until_output(prediction_id)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                prediction_id: prediction_id.to_string(),
                waited: self.settings.timeout,
            }),
        }
    }

    async fn poll_until_output(&self, prediction_id: &str) -> Result<String, ProviderError> {
        for attempt in 1..=self.settings.max_polls {
            sleep(self.settings.poll_interval).await;

            let prediction = self.prediction(prediction_id).await?;
            if let Some(url) = prediction.output_url() {
                tracing::debug!(prediction_id, attempt, "Prediction produced output");
                return Ok(url.to_string());
            }
            if prediction.has_failed() {
                return Err(ProviderError::Failed {
                    prediction_id: prediction_id.to_string(),
                    reason: prediction
                        .error
                        .unwrap_or_else(|| "no reason given".to_string()),
                });
            }

            tracing::trace!(
                prediction_id,
                attempt,
                status = prediction.status.as_deref().unwrap_or("unknown"),
                "Prediction not ready"
            );
        }

        Err(ProviderError::Timeout {
            prediction_id: prediction_id.to_string(),
            waited: self.poll_budget(),
        })
    }

    /// Total time spent sleeping between polls when every poll comes back empty.
    fn poll_budget(&self) -> Duration {
        self.settings
            .poll_interval
            .saturating_mul(self.settings.max_polls)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Prediction {prediction_id} failed: {reason}")]
    Failed { prediction_id: String, reason: String },

    #[error("Prediction {prediction_id} produced no output within {waited:?}")]
    Timeout {
        prediction_id: String,
        waited: Duration,
    },
}
