//! Review generation
//!
//! A review is produced from a diff and a chosen prompt template, with static
//! analysis output and retrieved project context folded into the prompt.

pub mod generator;

pub use generator::{GeneratedReview, RagReviewGenerator, ReviewGenerator};
