pub const SCHEMA: &str = r#"
-- articles table (one row per canonical URL)
CREATE TABLE IF NOT EXISTS articles (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT '',
    feed_url TEXT NOT NULL DEFAULT '',
    published_at TEXT,
    content_text TEXT NOT NULL DEFAULT '',
    summary TEXT,
    embedding TEXT,
    fetched_at TEXT NOT NULL DEFAULT (datetime('now')),
    ranked_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_articles_feed_url ON articles(feed_url);
CREATE INDEX IF NOT EXISTS idx_articles_ranked_at ON articles(ranked_at);

-- article_feeds table (every feed that has referenced an article)
CREATE TABLE IF NOT EXISTS article_feeds (
    article_id TEXT NOT NULL,
    feed_url TEXT NOT NULL,
    linked_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (article_id, feed_url)
);

CREATE INDEX IF NOT EXISTS idx_article_feeds_feed_url ON article_feeds(feed_url);

-- users table
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    handle TEXT,
    registered_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- subscriptions table
CREATE TABLE IF NOT EXISTS subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    feed_url TEXT NOT NULL,
    added_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(user_id, feed_url)
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_feed_url ON subscriptions(feed_url);

-- user_scores table (judge verdicts, one per user and article)
CREATE TABLE IF NOT EXISTS user_scores (
    user_id INTEGER NOT NULL,
    article_id TEXT NOT NULL,
    score INTEGER NOT NULL,
    topics TEXT NOT NULL DEFAULT '[]',
    reason TEXT NOT NULL DEFAULT '',
    delivered INTEGER NOT NULL DEFAULT 0,
    scored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, article_id)
);

CREATE INDEX IF NOT EXISTS idx_user_scores_scored_at ON user_scores(user_id, scored_at);

-- feedback table (append-only, article_id is not checked)
CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    article_id TEXT NOT NULL,
    signal INTEGER NOT NULL CHECK (signal IN (1, -1)),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_feedback_user_signal ON feedback(user_id, signal, created_at DESC);

-- tracked_articles table (user-seeded taste signals)
CREATE TABLE IF NOT EXISTS tracked_articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    embedding TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(user_id, url)
);
"#;
