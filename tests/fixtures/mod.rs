//! Prompts and image bytes shared by the HTTP tests

use base64::Engine;

/// A prompt together with the style it is submitted with
#[derive(Debug, Clone)]
pub struct PromptFixture {
    pub prompt: &'static str,
    pub style: Option<&'static str>,
    pub description: &'static str,
}

pub const UNSTYLED: PromptFixture = PromptFixture {
    prompt: "a red sunset over snowy mountains",
    style: None,
    description: "Plain prompt, eligible for the provider fast path",
};

pub const STYLED: PromptFixture = PromptFixture {
    prompt: "a lighthouse on a rocky coast at night",
    style: Some("myStyle123"),
    description: "Named style, always routed to the browser worker",
};

pub const TOO_SHORT: PromptFixture = PromptFixture {
    prompt: "short",
    style: None,
    description: "Below the ten character minimum",
};

/// Smallest byte sequence the store recognizes as a PNG.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub fn png_data_url() -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(PNG)
    )
}

/// Generator page while a job is still running.
pub fn working_page() -> String {
    r#"<html><body><div class="generation-progress">42%</div></body></html>"#.to_string()
}

/// Generator page once the image is shown.
pub fn finished_page() -> String {
    format!(
        r#"<html><body><img class="generated-image" src="{}"></body></html>"#,
        png_data_url()
    )
}
