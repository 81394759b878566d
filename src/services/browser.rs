//! Browser automation against the generator website.
//!
//! [`BrowserDriver`] is the narrow set of page operations the worker needs.
//! [`WebDriverSession`] implements it over the W3C WebDriver HTTP protocol
//! (chromedriver, geckodriver). Page state is read from the page source and
//! interpreted with CSS selectors by [`PageSelectors::inspect`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Page operations needed to drive one generation.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), AutomationError>;

    /// Replace the contents of the input matching `selector`.
    async fn fill(&mut self, selector: &str, text: &str) -> Result<(), AutomationError>;

    async fn click(&mut self, selector: &str) -> Result<(), AutomationError>;

    async fn page_source(&mut self) -> Result<String, AutomationError>;

    /// Drop any page state left behind by an aborted job.
    async fn reset(&mut self) -> Result<(), AutomationError>;

    async fn close(&mut self) -> Result<(), AutomationError>;
}

/// Plain settings for the browser path.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub generator_url: String,
    pub prompt_selector: String,
    pub style_selector: String,
    pub submit_selector: String,
    pub result_selector: String,
    pub progress_selector: String,
    pub error_selector: String,
    /// Hard deadline for one job's browser phase.
    pub job_timeout: Duration,
    pub poll_initial: Duration,
    pub poll_max: Duration,
    pub poll_max_attempts: u32,
}

/// What the generator page currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum PageState {
    /// Still generating. Carries the intermediate image, if one is shown.
    Working { preview: Option<String> },
    Ready { src: String },
    Failed { message: String },
}

/// Parsed selectors used to read the generator page.
#[derive(Debug)]
pub struct PageSelectors {
    result: Selector,
    progress: Selector,
    error: Selector,
}

impl PageSelectors {
    pub fn parse(settings: &BrowserSettings) -> Result<Self, AutomationError> {
        Ok(Self {
            result: parse_selector(&settings.result_selector)?,
            progress: parse_selector(&settings.progress_selector)?,
            error: parse_selector(&settings.error_selector)?,
        })
    }

    /// Classify a page source.
    ///
    /// An error element with text wins. Otherwise the result image counts as
    /// final once it has a `src` and no progress indicator is left on the page.
    pub fn inspect(&self, html: &str) -> PageState {
        let document = Html::parse_document(html);

        if let Some(message) = document
            .select(&self.error)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .find(|text| !text.is_empty())
        {
            return PageState::Failed { message };
        }

        let src = document
            .select(&self.result)
            .filter_map(|el| el.value().attr("src"))
            .map(str::trim)
            .find(|src| !src.is_empty())
            .map(str::to_string);

        let in_progress = document.select(&self.progress).next().is_some();

        match src {
            Some(src) if !in_progress => PageState::Ready { src },
            preview => PageState::Working { preview },
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector, AutomationError> {
    Selector::parse(css).map_err(|e| AutomationError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// A W3C WebDriver session, created lazily and recreated after a reset.
pub struct WebDriverSession {
    http: reqwest::Client,
    base_url: String,
    headless: bool,
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSession {
    session_id: String,
}

#[derive(Deserialize)]
struct WebDriverFailure {
    error: String,
    #[serde(default)]
    message: String,
}

impl WebDriverSession {
    pub fn new(base_url: impl Into<String>, headless: bool) -> Result<Self, AutomationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headless,
            session_id: None,
        })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--no-sandbox", "--disable-gpu", "--window-size=1280,900"];
        if self.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }

    async fn session(&mut self) -> Result<String, AutomationError> {
        if let Some(id) = &self.session_id {
            return Ok(id.clone());
        }
        let created: NewSession = self
            .command(Method::POST, "/session", Some(self.capabilities()))
            .await?;
        tracing::info!(session_id = %created.session_id, "Browser session created");
        self.session_id = Some(created.session_id.clone());
        Ok(created.session_id)
    }

    async fn find(&mut self, selector: &str) -> Result<(String, String), AutomationError> {
        let session = self.session().await?;
        let found: Value = self
            .command(
                Method::POST,
                &format!("/session/{session}/element"),
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        let element = element_id(&found).ok_or_else(|| AutomationError::WebDriver {
            error: "invalid element reference".to_string(),
            message: format!("no element id returned for {selector}"),
        })?;
        Ok((session, element))
    }

    async fn command<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, AutomationError> {
        let mut request = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let failure = response
                .json::<Envelope<WebDriverFailure>>()
                .await
                .map(|envelope| envelope.value);
            return Err(match failure {
                Ok(f) => AutomationError::WebDriver {
                    error: f.error,
                    message: f.message,
                },
                Err(_) => AutomationError::WebDriver {
                    error: status.to_string(),
                    message: String::new(),
                },
            });
        }

        Ok(response.json::<Envelope<T>>().await?.value)
    }
}

fn element_id(value: &Value) -> Option<String> {
    value.get(ELEMENT_KEY)?.as_str().map(str::to_string)
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), AutomationError> {
        let session = self.session().await?;
        let _: Value = self
            .command(
                Method::POST,
                &format!("/session/{session}/url"),
                Some(json!({ "url": url })),
            )
            .await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<(), AutomationError> {
        let (session, element) = self.find(selector).await?;
        let _: Value = self
            .command(
                Method::POST,
                &format!("/session/{session}/element/{element}/clear"),
                Some(json!({})),
            )
            .await?;
        let _: Value = self
            .command(
                Method::POST,
                &format!("/session/{session}/element/{element}/value"),
                Some(json!({ "text": text })),
            )
            .await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), AutomationError> {
        let (session, element) = self.find(selector).await?;
        let _: Value = self
            .command(
                Method::POST,
                &format!("/session/{session}/element/{element}/click"),
                Some(json!({})),
            )
            .await?;
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, AutomationError> {
        let session = self.session().await?;
        self.command(Method::GET, &format!("/session/{session}/source"), None)
            .await
    }

    async fn reset(&mut self) -> Result<(), AutomationError> {
        // The next job opens a new session.
        self.close().await
    }

    async fn close(&mut self) -> Result<(), AutomationError> {
        if let Some(session) = self.session_id.take() {
            let _: Value = self
                .command(Method::DELETE, &format!("/session/{session}"), None)
                .await?;
            tracing::info!(session_id = %session, "Browser session closed");
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("WebDriver request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error {error}: {message}")]
    WebDriver { error: String, message: String },

    #[error("Invalid selector {selector}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("Generator reported an error: {0}")]
    Generation(String),

    #[error("Generator returned an unusable image reference {0}")]
    ResultUrl(String),

    #[error("No result after {attempts} page checks")]
    PollExhausted { attempts: u32 },

    #[error("Browser generation exceeded {0:?}")]
    Timeout(Duration),
}
