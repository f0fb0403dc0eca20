use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub handle: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// A URL a user seeded as "more like this".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedArticle {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}
