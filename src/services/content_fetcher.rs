use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;

use crate::error::{AppError, Result};

const USER_AGENT_STRING: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Pages shorter than this after cleanup are treated as failed extractions.
const MIN_CONTENT_CHARS: usize = 200;

pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Fetch a page and extract its readable text, truncated to `max_chars`.
    /// `None` when the page could not be fetched or had too little text.
    pub async fn fetch_text(&self, article_url: &str, max_chars: usize) -> Result<Option<String>> {
        if url::Url::parse(article_url).is_err() {
            return Ok(None);
        }

        let response = self.client.get(article_url).send().await?;

        if !response.status().is_success() {
            tracing::debug!("Failed to fetch {}: {}", article_url, response.status());
            return Ok(None);
        }

        let html = response.text().await?;

        Ok(extract_content(&html).map(|text| truncate_chars(&text, max_chars)))
    }
}

/// Convert HTML to plain text and drop blank lines.
fn extract_content(html: &str) -> Option<String> {
    let text = match html2text::from_read(html.as_bytes(), 120) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return None;
        }
    };

    let cleaned: String = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.chars().count() > MIN_CONTENT_CHARS {
        Some(cleaned)
    } else {
        tracing::debug!("Extracted content too short ({} chars)", cleaned.len());
        None
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_content_collapses_blank_lines() {
        let paragraph = "Paged attention keeps the KV cache compact. ".repeat(8);
        let html = format!("<html><body><p>{paragraph}</p>\n\n\n<p>Second paragraph.</p></body></html>");
        let text = extract_content(&html).unwrap();
        assert!(text.contains("Paged attention"));
        assert!(text.contains("Second paragraph."));
        assert!(!text.contains("\n\n"));
    }

    #[test]
    fn test_extract_content_rejects_short_pages() {
        assert_eq!(extract_content("<html><body><p>Login</p></body></html>"), None);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
