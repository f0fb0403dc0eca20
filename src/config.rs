use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

const APP_DIR: &str = "feed-curator";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub groq_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,

    /// Directory holding `config.json`, `tokenizer.json` and
    /// `model.safetensors` for the sentence-embedding model.
    #[serde(default = "default_embedding_model_dir")]
    pub embedding_model_dir: String,

    /// Feeds every newly registered user is subscribed to.
    #[serde(default = "default_feeds")]
    pub default_feeds: Vec<String>,

    #[serde(default = "default_entries_per_feed")]
    pub entries_per_feed: usize,

    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Invite-only allowlist. An empty list admits nobody.
    #[serde(default)]
    pub allowed_user_ids: Vec<i64>,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub judge: JudgeConfig,

    #[serde(default)]
    pub digest: DigestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Minimum adjusted embedding score before the judge is consulted.
    pub similarity_threshold: f32,
    /// Minimum judge score for an article to be delivered.
    pub score_threshold: u8,
    pub cold_start_keywords: Vec<String>,
    pub liked_limit: usize,
    pub disliked_limit: usize,
    pub top_topics: usize,
    /// Profile text handed to the judge for users without history.
    pub cold_start_profile: String,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.65,
            score_threshold: 65,
            cold_start_keywords: [
                "vllm",
                "llm",
                "inference",
                "quantization",
                "kv cache",
                "speculative decoding",
                "rag",
                "agents",
                "fine-tuning",
                "benchmark",
                "transformer",
                "embeddings",
                "serving",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            liked_limit: 30,
            disliked_limit: 20,
            top_topics: 15,
            cold_start_profile:
                "No history yet. Focus on AI/ML research, LLM serving, inference optimization."
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub model: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.3-70b-versatile".to_string(),
            max_attempts: 5,
            base_delay_ms: 2000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub min_score: u8,
    pub max_items: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            min_score: 70,
            max_items: 15,
        }
    }
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("feed.db").to_string_lossy().to_string()
}

fn default_embedding_model_dir() -> String {
    data_dir()
        .join("all-MiniLM-L6-v2")
        .to_string_lossy()
        .to_string()
}

fn default_feeds() -> Vec<String> {
    vec![
        "https://huggingface.co/blog/feed.xml".to_string(),
        "https://blog.vllm.ai/feed.xml".to_string(),
    ]
}

fn default_entries_per_feed() -> usize {
    10
}

fn default_max_text_chars() -> usize {
    8000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            groq_api_key: None,
            telegram_bot_token: None,
            embedding_model_dir: default_embedding_model_dir(),
            default_feeds: default_feeds(),
            entries_per_feed: default_entries_per_feed(),
            max_text_chars: default_max_text_chars(),
            allowed_user_ids: Vec::new(),
            ranking: RankingConfig::default(),
            judge: JudgeConfig::default(),
            digest: DigestConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_env()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Environment variables win over the config file so secrets can stay out of it.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(key) = non_empty_env("GROQ_API_KEY") {
            self.groq_api_key = Some(key);
        }
        if let Some(token) = non_empty_env("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(token);
        }
        if let Some(path) = non_empty_env("FEED_CURATOR_DB") {
            self.db_path = path;
        }
        if let Some(raw) = non_empty_env("ALLOWED_USER_IDS") {
            self.allowed_user_ids = parse_user_ids(&raw)?;
        }
        Ok(())
    }

    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_user_ids.contains(&user_id)
    }

    pub fn require_groq_key(&self) -> Result<&str> {
        self.groq_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config(
                    "GROQ_API_KEY is not set; add groq_api_key to the config file or export it"
                        .to_string(),
                )
            })
    }

    pub fn require_telegram_token(&self) -> Result<&str> {
        self.telegram_bot_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config(
                    "TELEGRAM_BOT_TOKEN is not set; add telegram_bot_token to the config file or export it"
                        .to_string(),
                )
            })
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }
}

/// Comma-separated user ids, e.g. `"123, 456"`.
fn parse_user_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse()
                .map_err(|_| AppError::Config(format!("invalid id in ALLOWED_USER_IDS: {id}")))
        })
        .collect()
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_ranking_defaults() {
        let ranking = RankingConfig::default();
        assert!((ranking.similarity_threshold - 0.65).abs() < f32::EPSILON);
        assert_eq!(ranking.score_threshold, 65);
        assert_eq!(ranking.liked_limit, 30);
        assert_eq!(ranking.disliked_limit, 20);
        assert_eq!(ranking.top_topics, 15);
        assert!(ranking.cold_start_keywords.contains(&"vllm".to_string()));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
db_path = "/tmp/curator.db"

[ranking]
score_threshold = 80
cold_start_keywords = ["rust"]
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.db_path, "/tmp/curator.db");
        assert_eq!(config.ranking.score_threshold, 80);
        assert_eq!(config.ranking.cold_start_keywords, vec!["rust".to_string()]);
        assert_eq!(config.ranking.liked_limit, 30);
        assert_eq!(config.judge.max_attempts, 5);
        assert_eq!(config.digest.min_score, 70);
        assert_eq!(config.entries_per_feed, 10);
        assert!(config.allowed_user_ids.is_empty());
        assert!(!config.is_allowed(1));
    }

    #[test]
    fn test_allowlist_parsing() {
        assert_eq!(parse_user_ids("123, 456,,789 ").unwrap(), vec![123, 456, 789]);
        assert!(parse_user_ids("").unwrap().is_empty());
        assert!(matches!(parse_user_ids("12,bob"), Err(AppError::Config(_))));

        let config = Config {
            allowed_user_ids: vec![42],
            ..Config::default()
        };
        assert!(config.is_allowed(42));
        assert!(!config.is_allowed(7));
    }

    #[test]
    fn test_missing_groq_key_fails_fast() {
        let mut config = Config::default();
        config.groq_api_key = Some("   ".to_string());
        assert!(matches!(config.require_groq_key(), Err(AppError::Config(_))));

        config.groq_api_key = Some("gsk_test".to_string());
        assert_eq!(config.require_groq_key().unwrap(), "gsk_test");

        config.telegram_bot_token = Some("  ".to_string());
        assert!(config.require_telegram_token().is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ranking = 3").unwrap();
        assert!(matches!(
            Config::load_from(file.path()),
            Err(AppError::ConfigParse(_))
        ));
    }
}
