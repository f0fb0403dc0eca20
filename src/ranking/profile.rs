use std::collections::HashMap;

use crate::config::RankingConfig;
use crate::db::Repository;
use crate::error::Result;
use crate::models::RatedArticle;

/// Rendered when a profile has nothing to say.
pub const NO_HISTORY_TEXT: &str = "No preference history yet.";

/// Liked articles needed before similarity gating replaces the keyword gate.
const WARM_START_LIKES: usize = 5;

/// Titles of each polarity included in the rendered profile.
const RENDERED_TITLES: usize = 10;

/// Derived taste summary for one user. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct PreferenceProfile {
    pub liked: Vec<RatedArticle>,
    pub disliked: Vec<RatedArticle>,
    pub top_topics: Vec<String>,
    pub tracked_embeddings: Vec<Vec<f32>>,
}

impl PreferenceProfile {
    pub fn new(
        liked: Vec<RatedArticle>,
        disliked: Vec<RatedArticle>,
        tracked_embeddings: Vec<Vec<f32>>,
        top_topic_count: usize,
    ) -> Self {
        let top_topics = rank_topics(
            liked.iter().flat_map(|a| a.topics.iter().map(String::as_str)),
            top_topic_count,
        );
        Self {
            liked,
            disliked,
            top_topics,
            tracked_embeddings,
        }
    }

    /// Warm start: enough likes, or at least one tracked article.
    pub fn has_history(&self) -> bool {
        self.liked.len() >= WARM_START_LIKES || !self.tracked_embeddings.is_empty()
    }

    pub fn liked_titles(&self) -> impl Iterator<Item = &str> {
        titles(&self.liked)
    }

    pub fn disliked_titles(&self) -> impl Iterator<Item = &str> {
        titles(&self.disliked)
    }

    pub fn liked_embeddings(&self) -> impl Iterator<Item = &[f32]> {
        self.liked.iter().filter_map(|a| a.embedding.as_deref())
    }

    pub fn disliked_embeddings(&self) -> impl Iterator<Item = &[f32]> {
        self.disliked.iter().filter_map(|a| a.embedding.as_deref())
    }

    /// Compact text injected into every judge prompt.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();

        if !self.top_topics.is_empty() {
            lines.push(format!("Topics I like: {}", self.top_topics.join(", ")));
        }

        let liked: Vec<&str> = self.liked_titles().take(RENDERED_TITLES).collect();
        if !liked.is_empty() {
            lines.push("Recent articles I liked:".to_string());
            lines.extend(liked.iter().map(|t| format!("  + {t}")));
        }

        let disliked: Vec<&str> = self.disliked_titles().take(RENDERED_TITLES).collect();
        if !disliked.is_empty() {
            lines.push("Recent articles I did NOT like:".to_string());
            lines.extend(disliked.iter().map(|t| format!("  - {t}")));
        }

        if lines.is_empty() {
            NO_HISTORY_TEXT.to_string()
        } else {
            lines.join("\n")
        }
    }
}

fn titles(articles: &[RatedArticle]) -> impl Iterator<Item = &str> {
    articles
        .iter()
        .map(|a| a.title.as_str())
        .filter(|t| !t.trim().is_empty())
}

/// Most frequent topics, ties kept in first-seen order.
pub fn rank_topics<'a, I>(topics: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for topic in topics {
        match index.get(topic) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(topic, counts.len());
                counts.push((topic, 1));
            }
        }
    }

    // Stable sort keeps first-seen order among equal counts.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(limit)
        .map(|(topic, _)| topic.to_string())
        .collect()
}

/// Assembles profiles from storage using the configured history windows.
pub struct ProfileBuilder {
    liked_limit: usize,
    disliked_limit: usize,
    top_topics: usize,
}

impl ProfileBuilder {
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            liked_limit: config.liked_limit,
            disliked_limit: config.disliked_limit,
            top_topics: config.top_topics,
        }
    }

    pub async fn build(&self, repo: &Repository, user_id: i64) -> Result<PreferenceProfile> {
        let liked = repo.get_liked_articles(user_id, self.liked_limit).await?;
        let disliked = repo.get_disliked_articles(user_id, self.disliked_limit).await?;
        let tracked = repo.get_tracked_embeddings(user_id).await?;

        tracing::debug!(
            user_id,
            liked = liked.len(),
            disliked = disliked.len(),
            tracked = tracked.len(),
            "Built preference profile"
        );

        Ok(PreferenceProfile::new(liked, disliked, tracked, self.top_topics))
    }
}
