//! Preference profiles and the gate-then-judge ranking cascade.

mod pipeline;
mod profile;

pub use pipeline::{RankOutcome, Ranker};
