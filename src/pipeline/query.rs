// Question answering: retrieve -> prompt -> generate

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::RagContext;
use crate::models::{Answer, Query, RetrievedChunk};
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse};

/// Returned when the retrieved context cannot answer the question.
pub const FALLBACK_ANSWER: &str = "I don't know based on the provided documents.";

pub const PROMPT_TEMPLATE: &str = r#"You are a helpful AI assistant. Follow the Instructions strictly.

## Instructions:
- Answer the user's question based ONLY on the following context.
- Do not use any external knowledge.
- If the answer is not in the context, respond with "I don't know based on the provided documents."

<context>
{context}
</context>

Question: {question}
"#;

const CONTEXT_SEPARATOR: &str = "\n\n";

pub fn build_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}

/// Source names in first-seen order, without duplicates.
pub fn collect_sources(context: &[RetrievedChunk]) -> Vec<String> {
    let mut seen = HashSet::new();
    context
        .iter()
        .filter(|r| seen.insert(r.chunk.source.as_str()))
        .map(|r| r.chunk.source.clone())
        .collect()
}

impl RagContext {
    /// Answer `query` from the stored chunks. `model` overrides the
    /// configured chat model; the configured fallbacks are tried after it.
    pub async fn answer(&self, query: &Query, model: Option<&str>) -> AppResult<Answer> {
        let context = self.retriever.retrieve(query).await?;

        if context.is_empty() {
            info!("No context retrieved; returning fallback answer");
            return Ok(Answer {
                text: FALLBACK_ANSWER.to_string(),
                sources: Vec::new(),
                context,
            });
        }

        let context_block = context
            .iter()
            .map(|r| r.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let mut request = LLMRequest {
            model: model.unwrap_or(&self.settings.default_model).to_string(),
            messages: vec![LLMMessage::user(build_prompt(&context_block, &query.question))],
            max_tokens: None,
            temperature: Some(self.settings.temperature),
            system_instruction: None,
        };

        debug!(
            model = %request.model,
            chunks = context.len(),
            context_chars = context_block.len(),
            "Generating answer"
        );
        let response = self.generate(&mut request).await?;

        let sources = collect_sources(&context);
        info!(sources = ?sources, "Answer generated");
        Ok(Answer {
            text: response.content.trim().to_string(),
            sources,
            context,
        })
    }
}

impl RagContext {
    /// The requested model, then each configured fallback not already tried.
    fn candidate_models(&self, requested: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        std::iter::once(requested)
            .chain(self.settings.fallback_models.iter().map(String::as_str))
            .filter(|m| seen.insert(*m))
            .map(str::to_string)
            .collect()
    }

    async fn generate(&self, request: &mut LLMRequest) -> AppResult<LLMResponse> {
        let mut last_error = None;
        for model in self.candidate_models(&request.model) {
            request.model = model;
            match self.llm.create_chat_completion(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(model = %request.model, error = %e, "Model failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| AppError::Internal("no chat model configured".to_string())))
    }
}
