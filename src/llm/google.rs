// Google Gemini adapter (Generative Language REST API)
// Documentation: https://ai.google.dev/api/generate-content
//
// Requests authenticate with the `x-goog-api-key` header. Transport failures,
// 429 and 5xx responses are retried up to `max_retries` times; this is the
// client's own retry setting and the only retry in the crate.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse, TokenUsage};
use crate::utils::retry::with_retry;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Tried in order after the requested model fails.
pub const DEFAULT_FALLBACK_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-1.5-flash"];

const SERVICE: &str = "LLM";

pub struct GoogleAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

// Request types for the generateContent endpoint
#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Clone)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Clone)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

// Response types
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
    status: Option<String>,
}

/// One failed attempt, tagged with whether another attempt may help.
struct AttemptError {
    error: AppError,
    retryable: bool,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

/// `gemini-1.5-flash` -> `models/gemini-1.5-flash`; already-qualified names pass through.
pub(crate) fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

fn api_error(service: &'static str, status: StatusCode, body: &str) -> AppError {
    if let Ok(parsed) = serde_json::from_str::<GeminiErrorResponse>(body) {
        return AppError::external(
            service,
            format!(
                "API error ({}): {} (status: {})",
                status,
                parsed.error.message,
                parsed.error.status.unwrap_or_default()
            ),
        );
    }
    AppError::external(service, format!("API error ({}): {}", status, body))
}

/// Turn a non-2xx response into an `ExternalService` error carrying the API message.
pub(crate) async fn check_response(response: Response, service: &'static str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(api_error(service, status, &body))
}

impl GoogleAdapter {
    pub fn new(api_key: &str) -> Self {
        Self::with_client(Client::new(), api_key, GEMINI_API_BASE, DEFAULT_MAX_RETRIES)
    }

    pub fn with_client(client: Client, api_key: &str, base_url: &str, max_retries: u32) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn convert_message(msg: &LLMMessage) -> GeminiContent {
        let role = match msg.role.as_str() {
            "assistant" | "model" => "model",
            _ => "user",
        };
        GeminiContent {
            role: Some(role.to_string()),
            parts: vec![GeminiPart {
                text: msg.content.clone(),
            }],
        }
    }

    fn build_request(request: &LLMRequest) -> GenerateContentRequest {
        // System messages travel as systemInstruction, not as turns.
        let mut system_text: Vec<String> = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.clone())
            .collect();
        if let Some(instruction) = &request.system_instruction {
            system_text.insert(0, instruction.clone());
        }

        GenerateContentRequest {
            contents: request
                .messages
                .iter()
                .filter(|m| m.role != "system")
                .map(Self::convert_message)
                .collect(),
            system_instruction: (!system_text.is_empty()).then(|| GeminiContent {
                role: None,
                parts: system_text
                    .into_iter()
                    .map(|text| GeminiPart { text })
                    .collect(),
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    async fn send_once(
        client: Client,
        url: String,
        api_key: String,
        body: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, AttemptError> {
        let response = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptError {
                error: AppError::external(SERVICE, format!("Gemini request failed: {}", e)),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AttemptError {
                error: api_error(SERVICE, status, &text),
                retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
            });
        }

        response.json().await.map_err(|e| AttemptError {
            error: AppError::external(SERVICE, format!("Failed to parse Gemini response: {}", e)),
            retryable: false,
        })
    }
}

#[async_trait]
impl LLMAdapter for GoogleAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/{}:generateContent", self.base_url, model_path(&request.model));
        let body = Self::build_request(request);
        debug!(model = %request.model, turns = body.contents.len(), "Calling Gemini generateContent");

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let response = with_retry(
            || {
                Box::pin(Self::send_once(
                    client.clone(),
                    url.clone(),
                    api_key.clone(),
                    body.clone(),
                ))
            },
            self.max_retries,
            self.retry_delay,
            |e: &AttemptError| e.retryable,
        )
        .await
        .map_err(|e| {
            error!(model = %request.model, error = %e, "Gemini call failed");
            e.error
        })?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external(SERVICE, "Gemini returned no candidates"))?;

        let content = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = response
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            finish_reason: candidate.finish_reason.unwrap_or_else(|| "STOP".to_string()),
            usage,
        })
    }
}
