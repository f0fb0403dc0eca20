mod groq;
mod judge;
mod retry;

pub use groq::GroqJudge;
pub use judge::{JudgeError, JudgeErrorKind, RelevanceJudge};
