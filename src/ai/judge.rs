use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{Article, Judgement};

/// Characters of article body shown to the judge.
const EXCERPT_CHARS: usize = 1500;
const MAX_TOPICS: usize = 5;

/// Closed set of judge failure kinds; retry decisions key on this alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeErrorKind {
    /// Rate limiting, timeouts, connection failures, 5xx.
    Transient,
    /// The call succeeded but the body was not the expected JSON shape.
    MalformedResponse,
    /// Anything retrying cannot fix (bad credentials, bad request).
    Fatal,
}

impl fmt::Display for JudgeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeErrorKind::Transient => write!(f, "transient"),
            JudgeErrorKind::MalformedResponse => write!(f, "malformed response"),
            JudgeErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} judge failure: {message}")]
pub struct JudgeError {
    pub kind: JudgeErrorKind,
    pub message: String,
}

impl JudgeError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: JudgeErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: JudgeErrorKind::MalformedResponse,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: JudgeErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == JudgeErrorKind::Transient
    }
}

/// Scores one article against a rendered preference profile.
#[async_trait]
pub trait RelevanceJudge: Send + Sync {
    async fn judge(&self, article: &Article, profile_text: &str) -> Result<Judgement, JudgeError>;
}

pub fn build_prompt(article: &Article, profile_text: &str) -> String {
    let excerpt: String = article.content_text.chars().take(EXCERPT_CHARS).collect();
    format!(
        r#"You are a personalized article recommender.

User preference profile:
{profile_text}

Candidate article:
Title: {title}
Source: {source}
Excerpt: {excerpt}

Task:
1. Score relevance 0-100 (100 = perfect match for user's interests)
2. Extract up to 5 topic tags
3. One-sentence reason

Respond ONLY with valid JSON:
{{
  "score": <int 0-100>,
  "topics": ["tag1", "tag2"],
  "reason": "..."
}}"#,
        title = article.title,
        source = article.source,
    )
}

#[derive(Debug, Deserialize)]
struct RawJudgement {
    score: f64,
    #[serde(default)]
    topics: Vec<String>,
    reason: String,
}

/// Parses the judge's reply. Any deviation from the expected shape is a
/// [`JudgeErrorKind::MalformedResponse`].
pub fn parse_judgement(content: &str) -> Result<Judgement, JudgeError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(JudgeError::malformed("empty response"));
    }

    let raw: RawJudgement = serde_json::from_str(content)
        .map_err(|e| JudgeError::malformed(format!("invalid judgement JSON: {e}")))?;

    if !raw.score.is_finite() || !(0.0..=100.0).contains(&raw.score) {
        return Err(JudgeError::malformed(format!(
            "score {} outside 0-100",
            raw.score
        )));
    }

    let topics = raw
        .topics
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .take(MAX_TOPICS)
        .collect();

    Ok(Judgement {
        score: raw.score.round() as u8,
        topics,
        reason: raw.reason.trim().to_string(),
    })
}
