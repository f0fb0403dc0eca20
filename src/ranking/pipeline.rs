use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::profile::{PreferenceProfile, ProfileBuilder};
use crate::ai::{JudgeErrorKind, RelevanceJudge};
use crate::config::RankingConfig;
use crate::db::Repository;
use crate::embedding::{self, Embedder};
use crate::error::Result;
use crate::models::{Article, ScoredArticle};

/// Weight of the closest dislike relative to the closest like.
const DISLIKE_PENALTY: f32 = 0.5;

/// Why a candidate was not delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Cold-start user and no configured keyword in the article.
    ColdStartKeywords,
    /// Warm-start user but the article has no embedding to compare.
    NoEmbedding,
    /// Adjusted embedding score below the similarity threshold.
    Similarity { adjusted: f32 },
    /// The judge failed; nothing was persisted.
    Judge(JudgeErrorKind),
    /// The judge answered but scored below the threshold.
    LowScore(u8),
}

#[derive(Debug, Clone)]
pub enum RankOutcome {
    Accepted(ScoredArticle),
    Rejected(Rejection),
}

/// Runs the gate-then-judge cascade for one (user, article) pair.
pub struct Ranker {
    embedder: Arc<dyn Embedder>,
    judge: Arc<dyn RelevanceJudge>,
    profiles: ProfileBuilder,
    config: RankingConfig,
    keywords: Vec<String>,
}

impl Ranker {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        judge: Arc<dyn RelevanceJudge>,
        config: RankingConfig,
    ) -> Self {
        let keywords = config
            .cold_start_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            embedder,
            judge,
            profiles: ProfileBuilder::new(&config),
            config,
            keywords,
        }
    }

    pub async fn rank(
        &self,
        repo: &Repository,
        user_id: i64,
        article: &mut Article,
    ) -> Result<RankOutcome> {
        let embedding = self.ensure_embedding(repo, article).await?;
        let profile = self.profiles.build(repo, user_id).await?;

        let profile_text = if profile.has_history() {
            let Some(embedding) = embedding else {
                debug!(user_id, article_id = %article.id, "No embedding, cannot compare");
                return Ok(RankOutcome::Rejected(Rejection::NoEmbedding));
            };

            let adjusted = adjusted_score(&embedding, &profile);
            if adjusted < self.config.similarity_threshold {
                debug!(
                    user_id,
                    article_id = %article.id,
                    adjusted,
                    threshold = self.config.similarity_threshold,
                    "Rejected by similarity gate"
                );
                return Ok(RankOutcome::Rejected(Rejection::Similarity { adjusted }));
            }
            profile.render()
        } else {
            if !self.matches_cold_start(article) {
                debug!(user_id, article_id = %article.id, "Rejected by cold-start keywords");
                return Ok(RankOutcome::Rejected(Rejection::ColdStartKeywords));
            }
            self.config.cold_start_profile.clone()
        };

        let judgement = match self.judge.judge(article, &profile_text).await {
            Ok(judgement) => judgement,
            Err(err) => {
                error!(
                    user_id,
                    article_id = %article.id,
                    url = %article.url,
                    error = %err,
                    "Judge failed, dropping article for this user"
                );
                return Ok(RankOutcome::Rejected(Rejection::Judge(err.kind)));
            }
        };

        repo.upsert_score(user_id, article.id.clone(), &judgement).await?;

        if judgement.score < self.config.score_threshold {
            debug!(
                user_id,
                article_id = %article.id,
                score = judgement.score,
                "Judge score too low"
            );
            return Ok(RankOutcome::Rejected(Rejection::LowScore(judgement.score)));
        }

        info!(
            user_id,
            article_id = %article.id,
            score = judgement.score,
            title = %article.title,
            "Accepted article"
        );
        Ok(RankOutcome::Accepted(ScoredArticle {
            article: article.clone(),
            judgement,
        }))
    }

    /// Reuses a stored vector; otherwise embeds once and persists it.
    async fn ensure_embedding(
        &self,
        repo: &Repository,
        article: &mut Article,
    ) -> Result<Option<Vec<f32>>> {
        if article.embedding.is_none() {
            article.embedding = repo.get_article_embedding(article.id.clone()).await?;
        }
        if article.embedding.is_some() {
            return Ok(article.embedding.clone());
        }

        let Some(text) = embedding::article_text(&article.title, &article.content_text) else {
            return Ok(None);
        };

        match embedding::embed_blocking(Arc::clone(&self.embedder), text).await {
            Ok(vector) => {
                repo.store_embedding(article.id.clone(), &vector).await?;
                article.embedding = Some(vector.clone());
                Ok(Some(vector))
            }
            Err(e) => {
                warn!(article_id = %article.id, error = %e, "Failed to embed article");
                Ok(None)
            }
        }
    }

    fn matches_cold_start(&self, article: &Article) -> bool {
        let text = format!("{} {}", article.title, article.content_text).to_lowercase();
        self.keywords.iter().any(|kw| text.contains(kw.as_str()))
    }
}

/// `max(sim to liked or tracked) - 0.5 * max(sim to disliked)`.
pub fn adjusted_score(embedding: &[f32], profile: &PreferenceProfile) -> f32 {
    let sim_liked = embedding::max_similarity(
        embedding,
        profile
            .liked_embeddings()
            .chain(profile.tracked_embeddings.iter().map(Vec::as_slice)),
    );
    let sim_disliked = embedding::max_similarity(embedding, profile.disliked_embeddings());
    sim_liked - DISLIKE_PENALTY * sim_disliked
}
