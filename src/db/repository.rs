use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    Article, Feedback, Judgement, NewArticle, RatedArticle, Signal, TrackedArticle, User,
    UserScore,
};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "a.id, a.url, a.title, a.source, a.feed_url, a.published_at, \
     a.content_text, a.summary, a.embedding, a.fetched_at, a.ranked_at";

/// SQLite-backed storage. Every method is a single statement or a single
/// transaction and is atomic on its own; callers must not assume any
/// transaction spans two calls.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // User operations

    pub async fn register_user(&self, user_id: i64, handle: Option<String>) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO users (id, handle) VALUES (?1, ?2)
                       ON CONFLICT(id) DO UPDATE SET handle = COALESCE(excluded.handle, users.handle)"#,
                    params![user_id, handle],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, handle, registered_at FROM users WHERE id = ?1",
                        params![user_id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    // Subscription operations

    /// Returns false when the user was already subscribed.
    pub async fn add_subscription(&self, user_id: i64, feed_url: String) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO subscriptions (user_id, feed_url) VALUES (?1, ?2)",
                    params![user_id, feed_url],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    pub async fn get_user_feeds(&self, user_id: i64) -> Result<Vec<String>> {
        let feeds = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT feed_url FROM subscriptions WHERE user_id = ?1 ORDER BY added_at, id",
                )?;
                let feeds = stmt
                    .query_map(params![user_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn get_all_feed_urls(&self) -> Result<Vec<String>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT DISTINCT feed_url FROM subscriptions ORDER BY feed_url")?;
                let feeds = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    /// Users subscribed to any feed that has referenced the article.
    pub async fn get_article_subscribers(&self, article_id: String) -> Result<Vec<i64>> {
        let users = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT DISTINCT s.user_id FROM subscriptions s
                       WHERE s.feed_url IN (
                           SELECT feed_url FROM article_feeds WHERE article_id = ?1
                           UNION
                           SELECT feed_url FROM articles WHERE id = ?1
                       )
                       ORDER BY s.user_id"#,
                )?;
                let users = stmt
                    .query_map(params![article_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<i64>, _>>()?;
                Ok(users)
            })
            .await?;
        Ok(users)
    }

    // Article operations

    pub async fn article_exists(&self, url: String) -> Result<bool> {
        let exists = self
            .conn
            .call(move |conn| {
                let found = conn
                    .query_row("SELECT 1 FROM articles WHERE url = ?1", params![url], |_| Ok(()))
                    .optional()?;
                Ok(found.is_some())
            })
            .await?;
        Ok(exists)
    }

    /// Inserts at most once per URL; returns false when the article already existed.
    /// The originating feed is linked either way.
    pub async fn insert_article(&self, article: NewArticle) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    r#"INSERT OR IGNORE INTO articles
                           (id, url, title, source, feed_url, published_at, content_text, summary)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                    params![
                        article.id,
                        article.url,
                        article.title,
                        article.source,
                        article.feed_url,
                        article.published_at.map(|dt| dt.to_rfc3339()),
                        article.content_text,
                        article.summary,
                    ],
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO article_feeds (article_id, feed_url) VALUES (?1, ?2)",
                    params![article.id, article.feed_url],
                )?;
                tx.commit()?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    /// Records that `feed_url` references an existing article. A feed seen
    /// for the first time sends the article back to ranking so its
    /// subscribers are considered; returns whether the link is new.
    pub async fn link_article_feed(&self, article_id: String, feed_url: String) -> Result<bool> {
        let linked = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "INSERT OR IGNORE INTO article_feeds (article_id, feed_url) VALUES (?1, ?2)",
                    params![article_id, feed_url],
                )?;
                if changed > 0 {
                    tx.execute(
                        "UPDATE articles SET ranked_at = NULL WHERE id = ?1",
                        params![article_id],
                    )?;
                }
                tx.commit()?;
                Ok(changed > 0)
            })
            .await?;
        Ok(linked)
    }

    pub async fn get_article(&self, id: String) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles a WHERE a.id = ?1");
                let article = conn
                    .query_row(&sql, params![id], article_from_row)
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Articles that were stored but never made it through ranking.
    pub async fn get_unranked_articles(&self) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(|conn| {
                let sql = format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles a \
                     WHERE a.ranked_at IS NULL ORDER BY a.fetched_at, a.id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map([], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn mark_article_ranked(&self, id: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE articles SET ranked_at = datetime('now') WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_article_embedding(&self, id: String) -> Result<Option<Vec<f32>>> {
        let raw: Option<String> = self
            .conn
            .call(move |conn| {
                let raw = conn
                    .query_row(
                        "SELECT embedding FROM articles WHERE id = ?1",
                        params![id],
                        |row| row.get::<_, Option<String>>(0),
                    )
                    .optional()?;
                Ok(raw.flatten())
            })
            .await?;
        Ok(raw
            .map(|s| serde_json::from_str::<Vec<f32>>(&s))
            .transpose()?)
    }

    pub async fn store_embedding(&self, id: String, embedding: &[f32]) -> Result<()> {
        let json = serde_json::to_string(embedding)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE articles SET embedding = ?1 WHERE id = ?2",
                    params![json, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Score operations

    /// Re-scoring overwrites the verdict but keeps the delivered flag.
    pub async fn upsert_score(
        &self,
        user_id: i64,
        article_id: String,
        judgement: &Judgement,
    ) -> Result<()> {
        let topics = serde_json::to_string(&judgement.topics)?;
        let score = judgement.score;
        let reason = judgement.reason.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO user_scores (user_id, article_id, score, topics, reason)
                       VALUES (?1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(user_id, article_id) DO UPDATE SET
                           score = excluded.score,
                           topics = excluded.topics,
                           reason = excluded.reason,
                           scored_at = datetime('now')"#,
                    params![user_id, article_id, score, topics, reason],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_score(&self, user_id: i64, article_id: String) -> Result<Option<UserScore>> {
        let score = self
            .conn
            .call(move |conn| {
                let score = conn
                    .query_row(
                        r#"SELECT user_id, article_id, score, topics, reason, delivered, scored_at
                           FROM user_scores WHERE user_id = ?1 AND article_id = ?2"#,
                        params![user_id, article_id],
                        score_from_row,
                    )
                    .optional()?;
                Ok(score)
            })
            .await?;
        Ok(score)
    }

    pub async fn count_scores(&self, user_id: i64) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM user_scores WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    pub async fn mark_delivered(&self, user_id: i64, article_id: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE user_scores SET delivered = 1 WHERE user_id = ?1 AND article_id = ?2",
                    params![user_id, article_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn is_delivered(&self, user_id: i64, article_id: String) -> Result<bool> {
        let delivered = self
            .conn
            .call(move |conn| {
                let delivered: Option<bool> = conn
                    .query_row(
                        "SELECT delivered FROM user_scores WHERE user_id = ?1 AND article_id = ?2",
                        params![user_id, article_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(delivered.unwrap_or(false))
            })
            .await?;
        Ok(delivered)
    }

    /// Today's verdicts for one user at or above `min_score`, best first.
    pub async fn get_today_top_scores(
        &self,
        user_id: i64,
        min_score: u8,
        max_items: usize,
    ) -> Result<Vec<(Article, UserScore)>> {
        let limit = max_items as i64;
        let rows = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {ARTICLE_COLUMNS}, \
                            s.user_id, s.article_id, s.score, s.topics, s.reason, s.delivered, s.scored_at \
                     FROM user_scores s \
                     JOIN articles a ON a.id = s.article_id \
                     WHERE s.user_id = ?1 \
                       AND date(s.scored_at) = date('now') \
                       AND s.score >= ?2 \
                     ORDER BY s.score DESC, s.scored_at DESC \
                     LIMIT ?3"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![user_id, min_score, limit], |row| {
                        Ok((article_from_row(row)?, score_from_row_at(row, 11)?))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    // Feedback operations

    /// Pure append: repeated votes on the same article are all kept.
    pub async fn add_feedback(
        &self,
        user_id: i64,
        article_id: String,
        signal: Signal,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO feedback (user_id, article_id, signal) VALUES (?1, ?2, ?3)",
                    params![user_id, article_id, signal.value()],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// All votes for one pair, most recent first.
    pub async fn get_feedback(&self, user_id: i64, article_id: String) -> Result<Vec<Feedback>> {
        let feedback = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, user_id, article_id, signal, created_at FROM feedback
                       WHERE user_id = ?1 AND article_id = ?2
                       ORDER BY created_at DESC, id DESC"#,
                )?;
                let feedback = stmt
                    .query_map(params![user_id, article_id], feedback_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feedback)
            })
            .await?;
        Ok(feedback)
    }

    pub async fn get_liked_articles(&self, user_id: i64, limit: usize) -> Result<Vec<RatedArticle>> {
        self.get_rated_articles(user_id, Signal::Like, limit).await
    }

    pub async fn get_disliked_articles(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<RatedArticle>> {
        self.get_rated_articles(user_id, Signal::Dislike, limit).await
    }

    async fn get_rated_articles(
        &self,
        user_id: i64,
        signal: Signal,
        limit: usize,
    ) -> Result<Vec<RatedArticle>> {
        let limit = limit as i64;
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT a.id, a.title, s.topics, a.embedding
                       FROM feedback f
                       JOIN articles a ON a.id = f.article_id
                       LEFT JOIN user_scores s
                           ON s.user_id = f.user_id AND s.article_id = f.article_id
                       WHERE f.user_id = ?1 AND f.signal = ?2
                       ORDER BY f.created_at DESC, f.id DESC
                       LIMIT ?3"#,
                )?;
                let articles = stmt
                    .query_map(params![user_id, signal.value(), limit], |row| {
                        Ok(RatedArticle {
                            article_id: row.get(0)?,
                            title: row.get(1)?,
                            topics: optional_json_column(row, 2)?.unwrap_or_default(),
                            embedding: optional_json_column(row, 3)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    // Tracked article operations

    pub async fn add_tracked_article(
        &self,
        user_id: i64,
        url: String,
        embedding: Option<&[f32]>,
    ) -> Result<()> {
        let json = embedding.map(serde_json::to_string).transpose()?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO tracked_articles (user_id, url, embedding) VALUES (?1, ?2, ?3)
                       ON CONFLICT(user_id, url) DO UPDATE SET embedding = excluded.embedding"#,
                    params![user_id, url, json],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_tracked_articles(&self, user_id: i64) -> Result<Vec<TrackedArticle>> {
        let tracked = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, user_id, url, embedding, created_at FROM tracked_articles
                       WHERE user_id = ?1 ORDER BY created_at, id"#,
                )?;
                let tracked = stmt
                    .query_map(params![user_id], |row| {
                        Ok(TrackedArticle {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            url: row.get(2)?,
                            embedding: optional_json_column(row, 3)?,
                            created_at: datetime_column(row, 4)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tracked)
            })
            .await?;
        Ok(tracked)
    }

    /// Embeddings of tracked articles; rows whose extraction failed are skipped.
    pub async fn get_tracked_embeddings(&self, user_id: i64) -> Result<Vec<Vec<f32>>> {
        let tracked = self.get_tracked_articles(user_id).await?;
        Ok(tracked.into_iter().filter_map(|t| t.embedding).collect())
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn optional_datetime_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| parse_datetime(&s)))
}

fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(optional_datetime_column(row, idx)?.unwrap_or_else(Utc::now))
}

fn optional_json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        handle: row.get(1)?,
        registered_at: datetime_column(row, 2)?,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        source: row.get(3)?,
        feed_url: row.get(4)?,
        published_at: optional_datetime_column(row, 5)?,
        content_text: row.get(6)?,
        summary: row.get(7)?,
        embedding: optional_json_column(row, 8)?,
        fetched_at: datetime_column(row, 9)?,
        ranked_at: optional_datetime_column(row, 10)?,
    })
}

fn score_from_row(row: &Row) -> rusqlite::Result<UserScore> {
    score_from_row_at(row, 0)
}

fn score_from_row_at(row: &Row, offset: usize) -> rusqlite::Result<UserScore> {
    Ok(UserScore {
        user_id: row.get(offset)?,
        article_id: row.get(offset + 1)?,
        score: row.get(offset + 2)?,
        topics: optional_json_column(row, offset + 3)?.unwrap_or_default(),
        reason: row.get(offset + 4)?,
        delivered: row.get(offset + 5)?,
        scored_at: datetime_column(row, offset + 6)?,
    })
}

fn feedback_from_row(row: &Row) -> rusqlite::Result<Feedback> {
    let value: i64 = row.get(3)?;
    let signal = Signal::from_value(value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Integer,
            format!("invalid feedback signal {value}").into(),
        )
    })?;
    Ok(Feedback {
        id: row.get(0)?,
        user_id: row.get(1)?,
        article_id: row.get(2)?,
        signal,
        created_at: datetime_column(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_article(url: &str, title: &str) -> NewArticle {
        let mut article = NewArticle::new(
            url,
            title.to_string(),
            "Test Blog".to_string(),
            "https://example.com/feed.xml".to_string(),
        );
        article.content_text = format!("{title} body text");
        article
    }

    fn judgement(score: u8) -> Judgement {
        Judgement {
            score,
            topics: vec!["llm".to_string(), "serving".to_string()],
            reason: "Matches interest in serving.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_article_inserted_once_per_url() {
        let repo = Repository::in_memory().await.unwrap();
        let article = new_article("https://example.com/a", "A");
        let id = article.id.clone();

        assert!(repo.insert_article(article.clone()).await.unwrap());
        assert!(!repo.insert_article(article).await.unwrap());
        assert!(repo
            .article_exists("https://example.com/a".to_string())
            .await
            .unwrap());

        let unranked = repo.get_unranked_articles().await.unwrap();
        assert_eq!(unranked.len(), 1);
        assert_eq!(unranked[0].id, id);

        repo.mark_article_ranked(id).await.unwrap();
        assert!(repo.get_unranked_articles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_round_trip() {
        let repo = Repository::in_memory().await.unwrap();
        let article = new_article("https://example.com/a", "A");
        let id = article.id.clone();
        repo.insert_article(article).await.unwrap();

        assert!(repo.get_article_embedding(id.clone()).await.unwrap().is_none());
        repo.store_embedding(id.clone(), &[0.6, 0.8]).await.unwrap();
        assert_eq!(
            repo.get_article_embedding(id.clone()).await.unwrap(),
            Some(vec![0.6, 0.8])
        );
        let stored = repo.get_article(id).await.unwrap().unwrap();
        assert_eq!(stored.embedding, Some(vec![0.6, 0.8]));
    }

    #[tokio::test]
    async fn test_score_upsert_overwrites_and_keeps_delivered() {
        let repo = Repository::in_memory().await.unwrap();
        let article = new_article("https://example.com/a", "A");
        let id = article.id.clone();
        repo.insert_article(article).await.unwrap();

        repo.upsert_score(7, id.clone(), &judgement(40)).await.unwrap();
        repo.mark_delivered(7, id.clone()).await.unwrap();
        repo.upsert_score(7, id.clone(), &judgement(90)).await.unwrap();

        assert_eq!(repo.count_scores(7).await.unwrap(), 1);
        let score = repo.get_score(7, id.clone()).await.unwrap().unwrap();
        assert_eq!(score.score, 90);
        assert_eq!(score.topics, vec!["llm", "serving"]);
        assert!(score.delivered);
        assert!(repo.is_delivered(7, id).await.unwrap());
    }

    #[tokio::test]
    async fn test_feedback_is_append_only_most_recent_first() {
        let repo = Repository::in_memory().await.unwrap();
        let first = repo
            .add_feedback(1, "missing-item".to_string(), Signal::Like)
            .await
            .unwrap();
        let second = repo
            .add_feedback(1, "missing-item".to_string(), Signal::Dislike)
            .await
            .unwrap();

        let rows = repo.get_feedback(1, "missing-item".to_string()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, second);
        assert_eq!(rows[0].signal, Signal::Dislike);
        assert_eq!(rows[1].id, first);
    }

    #[tokio::test]
    async fn test_liked_articles_ordered_by_recency_with_topics() {
        let repo = Repository::in_memory().await.unwrap();
        let old = new_article("https://example.com/old", "Old");
        let new = new_article("https://example.com/new", "New");
        let (old_id, new_id) = (old.id.clone(), new.id.clone());
        repo.insert_article(old).await.unwrap();
        repo.insert_article(new).await.unwrap();
        repo.upsert_score(1, new_id.clone(), &judgement(80)).await.unwrap();

        repo.add_feedback(1, old_id.clone(), Signal::Like).await.unwrap();
        repo.add_feedback(1, new_id.clone(), Signal::Like).await.unwrap();
        repo.add_feedback(1, new_id.clone(), Signal::Dislike).await.unwrap();
        repo.add_feedback(2, old_id.clone(), Signal::Like).await.unwrap();

        let liked = repo.get_liked_articles(1, 30).await.unwrap();
        assert_eq!(liked.len(), 2);
        assert_eq!(liked[0].article_id, new_id);
        assert_eq!(liked[0].topics, vec!["llm", "serving"]);
        assert_eq!(liked[1].article_id, old_id);
        assert!(liked[1].topics.is_empty());

        let limited = repo.get_liked_articles(1, 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        let disliked = repo.get_disliked_articles(1, 20).await.unwrap();
        assert_eq!(disliked.len(), 1);
        assert_eq!(disliked[0].title, "New");
    }

    #[tokio::test]
    async fn test_subscriptions_and_subscribers() {
        let repo = Repository::in_memory().await.unwrap();
        repo.register_user(1, Some("ada".to_string())).await.unwrap();
        repo.register_user(1, None).await.unwrap();
        assert_eq!(
            repo.get_user(1).await.unwrap().unwrap().handle.as_deref(),
            Some("ada")
        );

        let feed = "https://example.com/feed.xml".to_string();
        assert!(repo.add_subscription(1, feed.clone()).await.unwrap());
        assert!(!repo.add_subscription(1, feed.clone()).await.unwrap());
        repo.add_subscription(2, feed.clone()).await.unwrap();

        assert_eq!(repo.get_user_feeds(1).await.unwrap(), vec![feed.clone()]);
        assert_eq!(repo.get_all_feed_urls().await.unwrap(), vec![feed.clone()]);

        let article = new_article("https://example.com/post", "Post");
        let id = article.id.clone();
        repo.insert_article(article).await.unwrap();
        assert_eq!(repo.get_article_subscribers(id).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_second_feed_link_reopens_ranking() {
        let repo = Repository::in_memory().await.unwrap();
        let other_feed = "https://mirror.example.com/feed.xml".to_string();
        repo.add_subscription(1, "https://example.com/feed.xml".to_string())
            .await
            .unwrap();
        repo.add_subscription(2, other_feed.clone()).await.unwrap();

        let article = new_article("https://example.com/shared", "Shared");
        let id = article.id.clone();
        repo.insert_article(article).await.unwrap();
        repo.mark_article_ranked(id.clone()).await.unwrap();
        assert_eq!(repo.get_article_subscribers(id.clone()).await.unwrap(), vec![1]);

        assert!(repo.link_article_feed(id.clone(), other_feed.clone()).await.unwrap());
        assert!(!repo.link_article_feed(id.clone(), other_feed).await.unwrap());

        let pending = repo.get_unranked_articles().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(repo.get_article_subscribers(id).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_tracked_embeddings_skip_failed_extractions() {
        let repo = Repository::in_memory().await.unwrap();
        repo.add_tracked_article(1, "https://a".to_string(), Some(&[1.0, 0.0]))
            .await
            .unwrap();
        repo.add_tracked_article(1, "https://b".to_string(), None)
            .await
            .unwrap();

        assert_eq!(repo.get_tracked_articles(1).await.unwrap().len(), 2);
        assert_eq!(
            repo.get_tracked_embeddings(1).await.unwrap(),
            vec![vec![1.0, 0.0]]
        );
    }

    #[tokio::test]
    async fn test_today_top_scores_filters_and_orders() {
        let repo = Repository::in_memory().await.unwrap();
        for (url, score) in [("https://x/1", 75u8), ("https://x/2", 95), ("https://x/3", 50)] {
            let article = new_article(url, url);
            let id = article.id.clone();
            repo.insert_article(article).await.unwrap();
            repo.upsert_score(1, id, &judgement(score)).await.unwrap();
        }

        let top = repo.get_today_top_scores(1, 70, 15).await.unwrap();
        let scores: Vec<u8> = top.iter().map(|(_, s)| s.score).collect();
        assert_eq!(scores, vec![95, 75]);
        assert_eq!(top[0].0.url, "https://x/2");

        assert!(repo.get_today_top_scores(2, 70, 15).await.unwrap().is_empty());
    }
}
