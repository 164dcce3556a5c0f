// src/extract.rs

use crate::config::{ExtractionBackend, ExtractionSection};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The prompt template that instructs the model to encode the invoice
/// into the two bracketed lists the parser expects.
const EXTRACTION_PROMPT: &str = r#"Analyze the provided image of an invoice and extract its details into a single-line string with two lists, formatted as follows:
The first list holds one entry per product on the invoice: Full Product Name (use the full name so every entry is unique), Quantity, Price (or Discounted Price, if applicable). If a product has a discount applied, report its final discounted price by deducting the discount amount from its original price.
The second list holds the summary fields: Total Amount Before Tax, Tax Amount, Total Amount After Tax. Ensure all amounts reflect any discounts applied.
Both lists should be enclosed in square brackets [] and separated by a semicolon ;. Omit any unrelated information, formatting artifacts, or decorative elements. Present the extracted data in plain text format.
Example output format:
[Product1, Quantity1, FinalPrice1; Product2, Quantity2, FinalPrice2; ...][TotalBeforeTax, TaxAmount, TotalAfterTax]"#;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("extraction API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("empty response from extraction model")]
    EmptyResponse,
    #[error("{0} env var required for the extraction backend")]
    MissingApiKey(String),
}

/// The extraction collaborator: raw image bytes in, encoded invoice
/// text out. Implementations may block on the network; the rest of the
/// pipeline never does.
#[async_trait]
pub trait InvoiceExtractor: Send + Sync {
    async fn extract(&self, image: &[u8]) -> Result<String, ExtractionError>;
}

/// Talks to the configured vision backend over HTTP.
pub struct VisionExtractor {
    client: Client,
    section: ExtractionSection,
}

impl VisionExtractor {
    pub fn new(section: ExtractionSection) -> Self {
        Self {
            client: Client::new(),
            section,
        }
    }
}

#[async_trait]
impl InvoiceExtractor for VisionExtractor {
    async fn extract(&self, image: &[u8]) -> Result<String, ExtractionError> {
        let text = match self.section.backend {
            ExtractionBackend::Gemini => {
                let endpoint = &self.section.gemini;
                info!(
                    url = %endpoint.base_url,
                    model = %endpoint.model,
                    "Using Gemini vision backend"
                );
                let api_key = resolve_api_key(&endpoint.api_key_env)?;
                extract_via_gemini(&self.client, endpoint, &api_key, image).await?
            }
            ExtractionBackend::OpenAi => {
                let endpoint = &self.section.openai;
                info!(
                    url = %endpoint.base_url,
                    model = %endpoint.model,
                    "Using OpenAI-compatible vision backend"
                );
                let api_key = resolve_api_key(&endpoint.api_key_env)?;
                extract_via_openai(&self.client, endpoint, &api_key, image).await?
            }
        };

        Ok(clean_response(&text))
    }
}

fn resolve_api_key(env_name: &str) -> Result<String, ExtractionError> {
    std::env::var(env_name).map_err(|_| ExtractionError::MissingApiKey(env_name.to_string()))
}

// ---------------------------------------------------------------------------
// Gemini generateContent API
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

async fn extract_via_gemini(
    client: &Client,
    endpoint: &crate::config::GeminiEndpoint,
    api_key: &str,
    image: &[u8],
) -> Result<String, ExtractionError> {
    let request = GeminiRequest {
        contents: vec![GeminiContent {
            parts: vec![
                GeminiPart {
                    text: None,
                    inline_data: Some(GeminiInlineData {
                        mime_type: "image/jpeg".to_string(),
                        data: BASE64.encode(image),
                    }),
                },
                GeminiPart {
                    text: Some(EXTRACTION_PROMPT.to_string()),
                    inline_data: None,
                },
            ],
        }],
    };

    let url = format!(
        "{}/models/{}:generateContent",
        endpoint.base_url, endpoint.model
    );

    let response = client
        .post(&url)
        .header("x-goog-api-key", api_key)
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ExtractionError::Api { status, body });
    }

    let parsed: GeminiResponse = response.json().await?;
    let text: String = parsed
        .candidates
        .first()
        .map(|c| {
            c.content
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }
    Ok(text)
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions API
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ChatContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

async fn extract_via_openai(
    client: &Client,
    endpoint: &crate::config::OpenAiEndpoint,
    api_key: &str,
    image: &[u8],
) -> Result<String, ExtractionError> {
    let request = ChatRequest {
        model: endpoint.model.clone(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: vec![
                ChatContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/jpeg;base64,{}", BASE64.encode(image)),
                    },
                },
                ChatContentPart::Text {
                    text: EXTRACTION_PROMPT.to_string(),
                },
            ],
        }],
        temperature: 0.0,
    };

    let url = format!("{}/chat/completions", endpoint.base_url);

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ExtractionError::Api { status, body });
    }

    let chat_response: ChatResponse = response.json().await?;
    let content = chat_response
        .choices
        .first()
        .map(|c| c.message.content.as_str())
        .ok_or(ExtractionError::EmptyResponse)?;

    if content.trim().is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }
    Ok(content.to_string())
}

// ---------------------------------------------------------------------------
// Response cleanup
// ---------------------------------------------------------------------------

/// Strip markdown fences the model may add despite instructions, then
/// pull the `[...][...]` payload out of any surrounding prose. When no
/// payload can be located, the cleaned text is returned as-is and left
/// for the parser to reject.
fn clean_response(raw: &str) -> String {
    let stripped = raw
        .trim()
        .trim_start_matches("```text")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match recover_payload(stripped) {
        Some(payload) => payload.to_string(),
        None => {
            warn!("No bracketed payload located in model response");
            stripped.to_string()
        }
    }
}

/// Locate the first pair of adjacent bracket groups in a string that
/// may contain commentary around the payload.
fn recover_payload(s: &str) -> Option<&str> {
    let re = Regex::new(r"\[[^\[\]]*\]\[[^\[\]]*\]").ok()?;
    re.find(s).map(|m| m.as_str())
}
