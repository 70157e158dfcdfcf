//! Seam for vector/hybrid search. No concrete provider ships in this
//! crate — wiring an actual embedding model is an external integration
//! concern; this module defines the trait and the two error paths a
//! caller hits before one is plugged in.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Converts text into a fixed-dimension embedding vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 for a
/// zero-magnitude vector rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Returns the error a caller should surface when `semantic_search_enabled`
/// is false in the project config.
pub fn disabled_error() -> Error {
    Error::SemanticSearchDisabled
}

/// Returns the error a caller should surface when semantic search is
/// enabled but no provider is configured or its dependencies are missing.
pub fn dependencies_missing_error(message: impl Into<String>) -> Error {
    Error::SemanticDependenciesMissing { message: message.into() }
}
