use std::time::Duration;

use feed_rs::parser;
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::NewArticle;

/// A feed URL confirmed to parse, plus its display title.
#[derive(Debug, Clone)]
pub struct DiscoveredFeed {
    pub url: String,
    pub title: String,
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("feed-curator/1.0")
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Fetches a feed and returns at most `limit` entries as candidate articles.
    /// Body text is whatever the feed itself carries.
    pub async fn fetch_feed(&self, feed_url: &str, limit: usize) -> Result<Vec<NewArticle>> {
        let response = self.client.get(feed_url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        parse_entries(&bytes, feed_url, limit)
    }

    /// Fetch many feeds concurrently; failures are logged and skipped.
    pub async fn refresh_all(
        &self,
        feed_urls: Vec<String>,
        limit: usize,
    ) -> Vec<(String, Vec<NewArticle>)> {
        stream::iter(feed_urls)
            .map(|feed_url| async move {
                match self.fetch_feed(&feed_url, limit).await {
                    Ok(articles) => {
                        tracing::debug!("Fetched {} entries from {}", articles.len(), feed_url);
                        Some((feed_url, articles))
                    }
                    Err(e) => {
                        tracing::warn!("Failed to fetch {}: {}", feed_url, e);
                        None
                    }
                }
            })
            .buffer_unordered(5) // Max 5 concurrent fetches
            .filter_map(|r| async { r })
            .collect()
            .await
    }

    /// Resolve a URL to a feed.
    /// A direct RSS/Atom URL is used as is; an HTML page is searched for
    /// `<link rel="alternate">` feed links.
    pub async fn discover_feed(&self, url: &str) -> Result<DiscoveredFeed> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch URL: HTTP {}", response.status()).into());
        }

        let final_url = response.url().to_string();
        let bytes = response.bytes().await?;

        if let Ok(feed) = parser::parse(&bytes[..]) {
            return Ok(DiscoveredFeed {
                title: feed.title.map(|t| t.content).unwrap_or_else(|| final_url.clone()),
                url: final_url,
            });
        }

        let html = String::from_utf8_lossy(&bytes);
        if let Some(feed_url) = find_feed_link(&html, &final_url) {
            let feed_response = self.client.get(&feed_url).send().await?;
            if feed_response.status().is_success() {
                let feed_bytes = feed_response.bytes().await?;
                if let Ok(feed) = parser::parse(&feed_bytes[..]) {
                    return Ok(DiscoveredFeed {
                        title: feed.title.map(|t| t.content).unwrap_or_else(|| feed_url.clone()),
                        url: feed_url,
                    });
                }
            }
        }

        Err(anyhow::anyhow!("Could not find RSS/Atom feed at {}", url).into())
    }
}

/// Turns raw feed bytes into candidate articles, skipping entries without a link.
fn parse_entries(bytes: &[u8], feed_url: &str, limit: usize) -> Result<Vec<NewArticle>> {
    let feed = parser::parse(bytes)?;
    let source = feed
        .title
        .map(|t| t.content)
        .unwrap_or_else(|| feed_url.to_string());

    let articles = feed
        .entries
        .into_iter()
        .take(limit)
        .filter_map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone())?;
            if link.trim().is_empty() {
                return None;
            }

            let summary_html = entry.summary.as_ref().map(|s| s.content.clone());
            let content_html = entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
                .or_else(|| summary_html.clone());

            let mut article = NewArticle::new(
                &link,
                entry.title.map(|t| t.content).unwrap_or_default(),
                source.clone(),
                feed_url.to_string(),
            );
            article.published_at = entry.published.or(entry.updated);
            article.content_text = content_html
                .and_then(|html| html2text::from_read(html.as_bytes(), 120).ok())
                .unwrap_or_default();
            article.summary = summary_html
                .and_then(|html| html2text::from_read(html.as_bytes(), 120).ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            Some(article)
        })
        .collect();

    Ok(articles)
}

/// Search HTML for RSS/Atom feed links
fn find_feed_link(html: &str, base_url: &str) -> Option<String> {
    // rel before type, then type alone
    let link_re = Regex::new(
        r#"<link[^>]*rel=["']alternate["'][^>]*type=["']application/(rss|atom)\+xml["'][^>]*href=["']([^"']+)["']"#,
    )
    .ok()?;
    let link_re2 =
        Regex::new(r#"<link[^>]*type=["']application/(rss|atom)\+xml["'][^>]*href=["']([^"']+)["']"#)
            .ok()?;

    let href = link_re
        .captures(html)
        .or_else(|| link_re2.captures(html))
        .and_then(|cap| cap.get(2))
        .map(|m| m.as_str().to_string())?;

    Some(resolve_url(&href, base_url))
}

/// Resolve a potentially relative URL against a base URL
fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    url::Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(|resolved| resolved.to_string())
        .unwrap_or_else(|_| href.to_string())
}
