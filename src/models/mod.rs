mod article;
mod feedback;
mod score;
mod user;

pub use article::{canonical_url, Article, NewArticle};
pub use feedback::{Feedback, RatedArticle, Signal};
pub use score::{Judgement, ScoredArticle, UserScore};
pub use user::{TrackedArticle, User};
