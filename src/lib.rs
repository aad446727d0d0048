// Gemini RAG - document question answering over a local vector collection

pub mod config;
pub mod console;
pub mod embeddings;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod storage;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;
pub use pipeline::RagContext;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
