// Embeddings, document loading, chunking and retrieval

pub mod document_processor;
pub mod encoder;
pub mod text_chunker;
pub mod vector_search;

pub use document_processor::*;
pub use encoder::*;
pub use text_chunker::*;
pub use vector_search::*;

/// Cosine similarity of two vectors; 0.0 if either has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
