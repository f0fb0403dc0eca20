use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{ScoredArticle, Signal};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Delivery boundary for accepted articles.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns `Ok` only once the item has actually been delivered.
    async fn deliver(&self, user_id: i64, item: &ScoredArticle) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest {
    chat_id: i64,
    text: String,
    disable_web_page_preview: bool,
    reply_markup: InlineKeyboardMarkup,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

/// Sends items to a user's private chat (chat id == user id).
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, bot_token })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, user_id: i64, item: &ScoredArticle) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: user_id,
            text: format_message(item),
            disable_web_page_preview: false,
            reply_markup: feedback_keyboard(&item.article.id),
        };

        let response = self
            .client
            .post(format!(
                "{}/bot{}/sendMessage",
                TELEGRAM_API_URL, self.bot_token
            ))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body: TelegramResponse = response.json().await?;
        if !status.is_success() || !body.ok {
            return Err(AppError::Telegram(format!(
                "sendMessage failed ({}): {}",
                status,
                body.description.unwrap_or_default()
            )));
        }

        Ok(())
    }
}

fn format_message(item: &ScoredArticle) -> String {
    let article = &item.article;
    let judgement = &item.judgement;
    format!(
        "📰 {}\n🔗 {}\n📌 Source: {}\n🏷 Topics: {}\n⭐ Score: {}/100\n💬 {}",
        article.title,
        article.url,
        article.source,
        judgement.topics.join(", "),
        judgement.score,
        judgement.reason,
    )
}

fn feedback_keyboard(item_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![
            InlineKeyboardButton {
                text: "👍 Like".to_string(),
                callback_data: Signal::Like.callback_data(item_id),
            },
            InlineKeyboardButton {
                text: "👎 Dislike".to_string(),
                callback_data: Signal::Dislike.callback_data(item_id),
            },
        ]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Judgement, NewArticle};

    fn item() -> ScoredArticle {
        ScoredArticle {
            article: NewArticle::new(
                "https://blog.vllm.ai/post",
                "Faster serving".to_string(),
                "vLLM Blog".to_string(),
                "https://blog.vllm.ai/feed.xml".to_string(),
            )
            .into(),
            judgement: Judgement {
                score: 82,
                topics: vec!["llm".to_string(), "serving".to_string()],
                reason: "Directly about serving.".to_string(),
            },
        }
    }

    #[test]
    fn test_message_contains_verdict() {
        let text = format_message(&item());
        assert!(text.contains("Faster serving"));
        assert!(text.contains("https://blog.vllm.ai/post"));
        assert!(text.contains("Topics: llm, serving"));
        assert!(text.contains("Score: 82/100"));
        assert!(text.contains("Directly about serving."));
    }

    #[test]
    fn test_keyboard_callbacks_round_trip() {
        let item = item();
        let keyboard = feedback_keyboard(&item.article.id);
        let buttons = &keyboard.inline_keyboard[0];
        assert_eq!(
            Signal::parse_callback(&buttons[0].callback_data),
            Some((Signal::Like, item.article.id.clone()))
        );
        assert_eq!(
            Signal::parse_callback(&buttons[1].callback_data),
            Some((Signal::Dislike, item.article.id.clone()))
        );
    }
}
