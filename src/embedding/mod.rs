//! Sentence embeddings and the similarity math the ranking gates use.
//!
//! Every vector that is ever compared must come from the same model with
//! the same truncation, so [`prepare_text`] is applied by every embedder.

use std::sync::Arc;

use crate::error::{AppError, Result};

mod bert;

pub use bert::BertEmbedder;

/// Characters of input text considered by the embedder.
pub const MAX_EMBED_CHARS: usize = 512;

/// Characters of article body appended to the title before embedding.
const ARTICLE_BODY_CHARS: usize = 400;

const SIMILARITY_EPSILON: f32 = 1e-9;

/// Maps text to a fixed-length, unit-normalized vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Runs the model forward pass on the blocking pool.
pub async fn embed_blocking(embedder: Arc<dyn Embedder>, text: String) -> Result<Vec<f32>> {
    tokio::task::spawn_blocking(move || embedder.embed(&text))
        .await
        .map_err(|e| AppError::Embedding(format!("embedding task failed: {e}")))?
}

/// Truncates to the first [`MAX_EMBED_CHARS`] characters (not bytes).
pub fn prepare_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Builds the embedding input for an article, or `None` when extraction
/// produced no body text.
pub fn article_text(title: &str, body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    let excerpt: String = body.chars().take(ARTICLE_BODY_CHARS).collect();
    Some(format!("{}\n\n{}", title.trim(), excerpt))
}

/// Cosine similarity in [-1, 1]; degenerate vectors give 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b + SIMILARITY_EPSILON)
}

/// Highest similarity between `candidate` and any of `others`, or 0 when
/// there is nothing to compare against.
pub fn max_similarity<'a, I>(candidate: &[f32], others: I) -> f32
where
    I: IntoIterator<Item = &'a [f32]>,
{
    others
        .into_iter()
        .map(|other| cosine_similarity(candidate, other))
        .fold(None, |best: Option<f32>, sim| Some(best.map_or(sim, |b| b.max(sim))))
        .unwrap_or(0.0)
}
