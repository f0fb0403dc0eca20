use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Article;

/// Parsed verdict of the relevance judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    pub score: u8,
    pub topics: Vec<String>,
    pub reason: String,
}

/// Persisted per-user score row; one per (user, article).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserScore {
    pub user_id: i64,
    pub article_id: String,
    pub score: u8,
    pub topics: Vec<String>,
    pub reason: String,
    pub delivered: bool,
    pub scored_at: DateTime<Utc>,
}

/// An accepted article with its judgement, handed to the notifier.
#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub article: Article,
    pub judgement: Judgement,
}
