use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::Repository;
use crate::embedding::{self, Embedder};
use crate::error::{AppError, Result};
use crate::feed::{DiscoveredFeed, FeedFetcher};
use crate::models::{canonical_url, NewArticle, ScoredArticle, Signal};
use crate::ranking::{RankOutcome, Ranker};
use crate::services::{truncate_chars, ContentFetcher, Notifier};

/// Counters for one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub ingested: usize,
    pub ranked: usize,
    pub accepted: usize,
    pub delivered: usize,
}

pub struct App {
    config: Config,
    pub repository: Repository,
    fetcher: FeedFetcher,
    content: ContentFetcher,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        Self::with_repository(config, repository)
    }

    pub fn with_repository(config: Config, repository: Repository) -> Result<Self> {
        Ok(Self {
            config,
            repository,
            fetcher: FeedFetcher::new()?,
            content: ContentFetcher::new()?,
        })
    }

    /// Every user-facing command goes through the invite-only allowlist.
    fn ensure_allowed(&self, user_id: i64) -> Result<()> {
        if self.config.is_allowed(user_id) {
            Ok(())
        } else {
            warn!(user_id, "Rejected user not on the allowlist");
            Err(AppError::NotAllowed(user_id))
        }
    }

    /// Registers the user and subscribes them to the default feeds.
    /// Returns how many new subscriptions were created.
    pub async fn register(&self, user_id: i64, handle: Option<String>) -> Result<usize> {
        self.ensure_allowed(user_id)?;
        if self.repository.get_user(user_id).await?.is_none() {
            info!(user_id, "New user");
        }
        self.repository.register_user(user_id, handle).await?;

        let mut added = 0;
        for feed_url in &self.config.default_feeds {
            if self
                .repository
                .add_subscription(user_id, feed_url.clone())
                .await?
            {
                added += 1;
            }
        }
        Ok(added)
    }

    pub async fn subscribe(&self, user_id: i64, url: &str) -> Result<DiscoveredFeed> {
        self.ensure_allowed(user_id)?;
        let feed = self.fetcher.discover_feed(url).await?;
        self.repository.register_user(user_id, None).await?;
        self.repository
            .add_subscription(user_id, feed.url.clone())
            .await?;
        info!(user_id, feed_url = %feed.url, "Subscribed to {}", feed.title);
        Ok(feed)
    }

    pub async fn feeds(&self, user_id: i64) -> Result<Vec<String>> {
        self.ensure_allowed(user_id)?;
        self.repository.get_user_feeds(user_id).await
    }

    /// Seeds the user's profile with an article. Returns whether an
    /// embedding could be computed; the URL is stored either way.
    pub async fn track(
        &self,
        user_id: i64,
        url: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<bool> {
        self.ensure_allowed(user_id)?;
        self.repository.register_user(user_id, None).await?;

        let text = self
            .content
            .fetch_text(url, self.config.max_text_chars)
            .await?;
        let embedding = match text.map(|t| t.trim().to_string()) {
            Some(text) if !text.is_empty() => {
                Some(embedding::embed_blocking(embedder, text).await?)
            }
            _ => None,
        };

        self.repository
            .add_tracked_article(user_id, canonical_url(url), embedding.as_deref())
            .await?;
        Ok(embedding.is_some())
    }

    pub async fn record_feedback(&self, user_id: i64, item_id: &str, signal: Signal) -> Result<i64> {
        self.ensure_allowed(user_id)?;
        let id = self
            .repository
            .add_feedback(user_id, item_id.to_string(), signal)
            .await?;
        info!(user_id, item_id, %signal, "Recorded feedback");
        Ok(id)
    }

    /// One full cycle: ingest new entries, rank everything not yet ranked,
    /// deliver accepted items.
    pub async fn poll(&self, ranker: &Ranker, notifier: &dyn Notifier) -> Result<PollReport> {
        let ingested = self.ingest().await?;
        let mut report = self.rank_pending(ranker, notifier).await?;
        report.ingested = ingested;
        info!(?report, "Poll cycle finished");
        Ok(report)
    }

    /// Stores entries of every subscribed feed whose URL is not known yet.
    pub async fn ingest(&self) -> Result<usize> {
        let feed_urls = self.repository.get_all_feed_urls().await?;
        let results = self
            .fetcher
            .refresh_all(feed_urls, self.config.entries_per_feed)
            .await;

        let mut inserted = 0;
        for (_, articles) in results {
            for article in articles {
                if self.store_entry(article).await? {
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    /// Stores one feed entry. An entry whose URL is already known is only
    /// linked to the feed that referenced it, so that feed's subscribers
    /// get it ranked too. Returns whether a new article was inserted.
    async fn store_entry(&self, mut article: NewArticle) -> Result<bool> {
        if self.repository.article_exists(article.url.clone()).await? {
            if self
                .repository
                .link_article_feed(article.id.clone(), article.feed_url.clone())
                .await?
            {
                debug!(
                    article_id = %article.id,
                    feed_url = %article.feed_url,
                    "Known article seen in another feed"
                );
            }
            return Ok(false);
        }

        match self
            .content
            .fetch_text(&article.url, self.config.max_text_chars)
            .await
        {
            Ok(Some(text)) => article.content_text = text,
            Ok(None) => {}
            Err(e) => debug!("Falling back to feed text for {}: {}", article.url, e),
        }
        article.content_text = truncate_chars(&article.content_text, self.config.max_text_chars);

        let title = article.title.clone();
        let inserted = self.repository.insert_article(article).await?;
        if inserted {
            info!("New article: {}", title);
        }
        Ok(inserted)
    }

    /// Ranks every stored article that has not completed ranking, for each
    /// allowed subscriber of any feed that referenced it. An article is
    /// marked ranked only after all of its subscribers were processed, so an
    /// interrupted run resumes.
    pub async fn rank_pending(&self, ranker: &Ranker, notifier: &dyn Notifier) -> Result<PollReport> {
        let mut report = PollReport::default();

        for mut article in self.repository.get_unranked_articles().await? {
            let subscribers = self
                .repository
                .get_article_subscribers(article.id.clone())
                .await?;

            for user_id in subscribers {
                if !self.config.is_allowed(user_id) {
                    debug!(user_id, "Skipping subscriber not on the allowlist");
                    continue;
                }
                match ranker.rank(&self.repository, user_id, &mut article).await? {
                    RankOutcome::Accepted(item) => {
                        report.accepted += 1;
                        if self.deliver(notifier, user_id, &item).await? {
                            report.delivered += 1;
                        }
                    }
                    RankOutcome::Rejected(reason) => {
                        debug!(user_id, article_id = %article.id, ?reason, "Article rejected");
                    }
                }
            }

            self.repository.mark_article_ranked(article.id.clone()).await?;
            report.ranked += 1;
        }

        Ok(report)
    }

    async fn deliver(&self, notifier: &dyn Notifier, user_id: i64, item: &ScoredArticle) -> Result<bool> {
        let article_id = item.article.id.clone();
        if self
            .repository
            .is_delivered(user_id, article_id.clone())
            .await?
        {
            return Ok(false);
        }

        match notifier.deliver(user_id, item).await {
            Ok(()) => {
                self.repository.mark_delivered(user_id, article_id).await?;
                Ok(true)
            }
            Err(e) => {
                warn!(user_id, article_id = %article_id, "Delivery failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Markdown list of today's best-scored items for one user.
    pub async fn digest(&self, user_id: i64) -> Result<String> {
        self.ensure_allowed(user_id)?;
        let items = self
            .repository
            .get_today_top_scores(
                user_id,
                self.config.digest.min_score,
                self.config.digest.max_items,
            )
            .await?;

        let today = chrono::Utc::now().format("%Y-%m-%d");
        if items.is_empty() {
            return Ok(format!("# Digest {today}\n\nNothing scored above {} today.\n", self.config.digest.min_score));
        }

        let mut out = format!("# Digest {today}\n\n");
        for (i, (article, score)) in items.iter().enumerate() {
            out.push_str(&format!(
                "{}. [{}]({}) ({}/100, {})\n   {}\n",
                i + 1,
                article.title,
                article.url,
                score.score,
                score.topics.join(", "),
                score.reason
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{JudgeError, RelevanceJudge};
    use crate::models::{Article, Judgement};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const FEED: &str = "https://blog.vllm.ai/feed.xml";

    struct ConstEmbedder;

    impl Embedder for ConstEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct ConstJudge(u8);

    #[async_trait]
    impl RelevanceJudge for ConstJudge {
        async fn judge(
            &self,
            _article: &Article,
            _profile_text: &str,
        ) -> std::result::Result<Judgement, JudgeError> {
            Ok(Judgement {
                score: self.0,
                topics: vec!["llm".to_string()],
                reason: "Fits.".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(i64, String)>>,
        fail: bool,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, user_id: i64, item: &ScoredArticle) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Telegram("chat not found".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((user_id, item.article.id.clone()));
            Ok(())
        }
    }

    async fn app() -> App {
        let repo = Repository::in_memory().await.unwrap();
        let config = Config {
            default_feeds: vec![FEED.to_string()],
            allowed_user_ids: vec![1, 2],
            ..Config::default()
        };
        App::with_repository(config, repo).unwrap()
    }

    fn ranker(score: u8) -> Ranker {
        Ranker::new(
            Arc::new(ConstEmbedder),
            Arc::new(ConstJudge(score)),
            Config::default().ranking,
        )
    }

    fn entry(feed_url: &str, url: &str, title: &str, body: &str) -> NewArticle {
        let mut article = NewArticle::new(url, title.to_string(), "vLLM Blog".to_string(), feed_url.to_string());
        article.content_text = body.to_string();
        article
    }

    async fn ingest(app: &App, url: &str, title: &str, body: &str) -> String {
        let article = entry(FEED, url, title, body);
        let id = article.id.clone();
        app.repository.insert_article(article).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_register_subscribes_default_feeds_once() {
        let app = app().await;
        assert_eq!(app.register(1, Some("ada".to_string())).await.unwrap(), 1);
        assert_eq!(app.register(1, None).await.unwrap(), 0);
        assert_eq!(app.feeds(1).await.unwrap(), vec![FEED.to_string()]);
    }

    #[tokio::test]
    async fn test_rank_pending_delivers_to_subscribers_once() {
        let app = app().await;
        app.register(1, None).await.unwrap();
        app.register(2, None).await.unwrap();
        let id = ingest(&app, "https://blog.vllm.ai/a", "vLLM inference", "serving llms").await;
        ingest(&app, "https://blog.vllm.ai/b", "Cooking", "pasta recipes").await;

        let notifier = RecordingNotifier::default();
        let report = app.rank_pending(&ranker(80), &notifier).await.unwrap();

        assert_eq!(report.ranked, 2);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(*notifier.sent.lock().unwrap(), vec![(1, id.clone()), (2, id.clone())]);
        assert!(app.repository.is_delivered(1, id).await.unwrap());

        // Everything is ranked now; a second pass does nothing.
        let again = app.rank_pending(&ranker(80), &notifier).await.unwrap();
        assert_eq!(again, PollReport::default());
        assert_eq!(notifier.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_delivery_leaves_item_undelivered() {
        let app = app().await;
        app.register(1, None).await.unwrap();
        let id = ingest(&app, "https://blog.vllm.ai/a", "vLLM inference", "serving llms").await;

        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let report = app.rank_pending(&ranker(80), &notifier).await.unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.delivered, 0);
        assert!(!app.repository.is_delivered(1, id.clone()).await.unwrap());
        assert!(app.repository.get_score(1, id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_feedback_and_digest() {
        let app = app().await;
        app.register(1, None).await.unwrap();
        let id = ingest(&app, "https://blog.vllm.ai/a", "vLLM inference", "serving llms").await;
        app.rank_pending(&ranker(90), &RecordingNotifier::default())
            .await
            .unwrap();

        app.record_feedback(1, &id, Signal::Like).await.unwrap();
        app.record_feedback(1, &id, Signal::Like).await.unwrap();
        assert_eq!(app.repository.get_feedback(1, id).await.unwrap().len(), 2);

        let digest = app.digest(1).await.unwrap();
        assert!(digest.contains("1. [vLLM inference](https://blog.vllm.ai/a) (90/100, llm)"));

        let empty = app.digest(2).await.unwrap();
        assert!(empty.contains("Nothing scored above 70 today."));
    }

    #[tokio::test]
    async fn test_article_shared_by_two_feeds_reaches_both_audiences() {
        const MIRROR: &str = "https://mirror.example.com/feed.xml";
        let app = app().await;
        app.register(1, None).await.unwrap();
        app.repository
            .add_subscription(2, MIRROR.to_string())
            .await
            .unwrap();

        let id = ingest(&app, "https://blog.vllm.ai/a", "vLLM inference", "serving llms").await;
        let notifier = RecordingNotifier::default();
        app.rank_pending(&ranker(80), &notifier).await.unwrap();
        assert_eq!(*notifier.sent.lock().unwrap(), vec![(1, id.clone())]);

        // The mirror feed later carries the same post.
        let seen_again = entry(MIRROR, "https://blog.vllm.ai/a#top", "vLLM inference", "serving llms");
        assert!(!app.store_entry(seen_again).await.unwrap());

        let report = app.rank_pending(&ranker(80), &notifier).await.unwrap();
        assert_eq!(report.ranked, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(*notifier.sent.lock().unwrap(), vec![(1, id.clone()), (2, id.clone())]);
        assert!(app.repository.is_delivered(2, id).await.unwrap());
    }

    #[tokio::test]
    async fn test_users_outside_allowlist_are_refused_and_skipped() {
        let app = app().await;
        app.register(1, None).await.unwrap();

        assert!(matches!(app.register(3, None).await, Err(AppError::NotAllowed(3))));
        assert!(matches!(app.feeds(3).await, Err(AppError::NotAllowed(3))));
        assert!(matches!(
            app.record_feedback(3, "abc", Signal::Like).await,
            Err(AppError::NotAllowed(3))
        ));
        assert!(matches!(app.digest(3).await, Err(AppError::NotAllowed(3))));
        assert!(app.repository.get_user(3).await.unwrap().is_none());

        // A subscription that predates the allowlist change is not served.
        app.repository
            .add_subscription(3, FEED.to_string())
            .await
            .unwrap();
        let id = ingest(&app, "https://blog.vllm.ai/a", "vLLM inference", "serving llms").await;
        let notifier = RecordingNotifier::default();
        let report = app.rank_pending(&ranker(80), &notifier).await.unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(*notifier.sent.lock().unwrap(), vec![(1, id.clone())]);
        assert!(app.repository.get_score(3, id).await.unwrap().is_none());
    }
}
