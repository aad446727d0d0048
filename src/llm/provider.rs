use std::sync::Arc;

use async_trait::async_trait;

use crate::config::LLMConfig;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Configuration for an LLM provider
pub struct LLMProviderConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    pub max_retries: u32,
    pub timeout: std::time::Duration,
}

impl LLMProviderConfig {
    pub fn google(config: &LLMConfig) -> Self {
        Self {
            name: "google".to_string(),
            api_key: config.google_api_key.clone(),
            base_url: config.base_url.clone(),
            max_retries: config.max_retries,
            timeout: std::time::Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[derive(Clone)]
pub struct LLM {
    adapter: Arc<dyn LLMAdapter>,
    provider_name: String,
}

impl LLM {
    pub fn new(provider: LLMProviderConfig) -> AppResult<Self> {
        let adapter: Arc<dyn LLMAdapter> = match provider.name.as_str() {
            "google" | "gemini" => {
                let client = reqwest::Client::builder()
                    .timeout(provider.timeout)
                    .build()
                    .map_err(|e| AppError::Configuration(format!("failed to build HTTP client: {}", e)))?;
                Arc::new(crate::llm::google::GoogleAdapter::with_client(
                    client,
                    &provider.api_key,
                    &provider.base_url,
                    provider.max_retries,
                ))
            }
            other => {
                return Err(AppError::Configuration(format!("Unsupported provider: {}", other)));
            }
        };

        Ok(Self {
            adapter,
            provider_name: provider.name,
        })
    }

    /// Wrap an existing adapter (used for substitutes and tests).
    pub fn from_adapter(name: impl Into<String>, adapter: Arc<dyn LLMAdapter>) -> Self {
        Self {
            adapter,
            provider_name: name.into(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> LLMProviderConfig {
        LLMProviderConfig {
            name: name.to_string(),
            api_key: "test-key".to_string(),
            base_url: crate::llm::google::GEMINI_API_BASE.to_string(),
            max_retries: 2,
            timeout: std::time::Duration::from_secs(5),
        }
    }

    #[test]
    fn test_google_provider_accepted() {
        let llm = LLM::new(provider("gemini")).unwrap();
        assert_eq!(llm.provider_name(), "gemini");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(matches!(LLM::new(provider("glm")), Err(AppError::Configuration(_))));
    }
}
