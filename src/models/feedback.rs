use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Like,
    Dislike,
}

impl Signal {
    pub fn value(self) -> i64 {
        match self {
            Signal::Like => 1,
            Signal::Dislike => -1,
        }
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(Signal::Like),
            -1 => Some(Signal::Dislike),
            _ => None,
        }
    }

    /// Parses inline-button callback data such as `like:3f9a…`.
    pub fn parse_callback(data: &str) -> Option<(Self, String)> {
        let (action, item_id) = data.split_once(':')?;
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return None;
        }
        let signal = match action {
            "like" => Signal::Like,
            "dislike" => Signal::Dislike,
            _ => return None,
        };
        Some((signal, item_id.to_string()))
    }

    pub fn callback_data(self, item_id: &str) -> String {
        format!("{}:{}", self, item_id)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Like => write!(f, "like"),
            Signal::Dislike => write!(f, "dislike"),
        }
    }
}

impl FromStr for Signal {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" | "+1" | "1" | "up" => Ok(Signal::Like),
            "dislike" | "-1" | "down" => Ok(Signal::Dislike),
            other => Err(AppError::Config(format!("unknown feedback signal: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub user_id: i64,
    pub article_id: String,
    pub signal: Signal,
    pub created_at: DateTime<Utc>,
}

/// An article the user voted on, as seen by the profile builder.
/// Repeated votes on one article yield repeated entries.
#[derive(Debug, Clone)]
pub struct RatedArticle {
    pub article_id: String,
    pub title: String,
    pub topics: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_parsing() {
        assert_eq!("like".parse::<Signal>().unwrap(), Signal::Like);
        assert_eq!("+1".parse::<Signal>().unwrap(), Signal::Like);
        assert_eq!("-1".parse::<Signal>().unwrap(), Signal::Dislike);
        assert_eq!("Dislike".parse::<Signal>().unwrap(), Signal::Dislike);
        assert!("meh".parse::<Signal>().is_err());
    }

    #[test]
    fn test_callback_data() {
        assert_eq!(Signal::Like.callback_data("abc"), "like:abc");
        assert_eq!(
            Signal::parse_callback("dislike:abc"),
            Some((Signal::Dislike, "abc".to_string()))
        );
        assert_eq!(Signal::parse_callback("like:"), None);
        assert_eq!(Signal::parse_callback("share:abc"), None);
        assert_eq!(Signal::parse_callback("abc"), None);
    }

    #[test]
    fn test_value_round_trip() {
        assert_eq!(Signal::from_value(Signal::Like.value()), Some(Signal::Like));
        assert_eq!(Signal::from_value(0), None);
    }
}
