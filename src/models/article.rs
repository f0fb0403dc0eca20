use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Article as handed over by ingestion, before it has been stored.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub id: String,
    pub url: String,
    pub title: String,
    pub source: String,
    pub feed_url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub content_text: String,
    pub summary: Option<String>,
}

impl NewArticle {
    pub fn new(url: &str, title: String, source: String, feed_url: String) -> Self {
        let url = canonical_url(url);
        Self {
            id: article_id(&url),
            url,
            title,
            source,
            feed_url,
            published_at: None,
            content_text: String::new(),
            summary: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub url: String,
    pub title: String,
    pub source: String,
    pub feed_url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub content_text: String,
    pub summary: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub fetched_at: DateTime<Utc>,
    pub ranked_at: Option<DateTime<Utc>>,
}

impl From<NewArticle> for Article {
    fn from(article: NewArticle) -> Self {
        Self {
            id: article.id,
            url: article.url,
            title: article.title,
            source: article.source,
            feed_url: article.feed_url,
            published_at: article.published_at,
            content_text: article.content_text,
            summary: article.summary,
            embedding: None,
            fetched_at: Utc::now(),
            ranked_at: None,
        }
    }
}

/// Normalizes a URL so the same page always hashes to the same id.
/// Unparseable input is only trimmed.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// First 16 hex chars of the SHA-256 of the canonical URL.
pub fn article_id(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_stable_and_short() {
        let a = article_id("https://blog.vllm.ai/2025/01/01/post.html");
        let b = article_id("https://blog.vllm.ai/2025/01/01/post.html");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_canonical_url_drops_fragment_and_case_of_host() {
        assert_eq!(
            canonical_url("  https://HuggingFace.co/blog/post#comments "),
            "https://huggingface.co/blog/post"
        );
        assert_eq!(canonical_url("not a url"), "not a url");
    }

    #[test]
    fn test_new_article_ids_match_for_equivalent_urls() {
        let a = NewArticle::new(
            "https://example.com/a#top",
            "A".into(),
            "Example".into(),
            "https://example.com/feed".into(),
        );
        let b = NewArticle::new(
            "https://EXAMPLE.com/a",
            "A".into(),
            "Example".into(),
            "https://example.com/feed".into(),
        );
        assert_eq!(a.id, b.id);
        assert_eq!(a.url, b.url);
    }

    #[test]
    fn test_article_from_new_article_starts_unranked() {
        let mut new = NewArticle::new(
            "https://blog.vllm.ai/post",
            "Post".into(),
            "vLLM Blog".into(),
            "https://blog.vllm.ai/feed.xml".into(),
        );
        new.content_text = "body".into();

        let article: Article = new.clone().into();
        assert_eq!(article.id, new.id);
        assert_eq!(article.content_text, "body");
        assert!(article.embedding.is_none());
        assert!(article.ranked_at.is_none());
    }
}
