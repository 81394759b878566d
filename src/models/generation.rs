use garde::Validate;
use serde::{Deserialize, Serialize};

/// Query string of `GET /generateImage`.
///
/// `prompt` is optional at the extractor level so that a missing prompt is
/// reported as a validation error rather than a query rejection.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[garde(required, length(chars, min = 10, max = 2000))]
    pub prompt: Option<String>,

    /// Named custom style (LoRA). Blank values count as absent.
    #[serde(alias = "loraName")]
    #[garde(length(max = 200))]
    pub style: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, style: Option<&str>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            style: style.map(str::to_string),
        }
    }

    /// Split a validated request into its prompt and normalized style.
    pub fn into_parts(self) -> (String, Option<String>) {
        let style = self
            .style
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        (self.prompt.unwrap_or_default(), style)
    }
}

/// Response after a request was accepted.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub image_id: String,
}
