//! Review scoring
//!
//! A review is scored with local heuristics and an LLM meta-evaluation. The
//! two are blended into the scalar reward the selector learns from.

pub mod heuristics;
pub mod meta;

use std::sync::Arc;
use std::time::Duration;

use humantime_serde::re::humantime::format_duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use heuristics::{heuristic_metrics, heuristics_to_score, HeuristicMetrics};
pub use meta::{
    meta_to_score, parse_meta_response, LlmMetaEvaluator, MetaEvaluation, MetaEvaluator,
    MetaRatings,
};

/// Meta-evaluation share of the final score
pub const META_WEIGHT: f64 = 0.7;
/// Heuristic share of the final score
pub const HEURISTIC_WEIGHT: f64 = 0.3;

/// Round half away from zero to 2 decimals
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Blended score and its components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalScore {
    pub final_score: f64,
    pub meta_score: Option<f64>,
    pub heuristic_score: f64,
}

/// Blend heuristic and meta scores
///
/// An error marker leaves the heuristic score as the final score.
pub fn combine_final_score(metrics: &HeuristicMetrics, meta: &MetaEvaluation) -> FinalScore {
    let heuristic_score = heuristics_to_score(metrics);
    let meta_score = meta_to_score(meta);

    let final_score = match meta_score {
        Some(m) => round2(META_WEIGHT * m + HEURISTIC_WEIGHT * heuristic_score),
        None => round2(heuristic_score),
    };

    FinalScore {
        final_score,
        meta_score,
        heuristic_score,
    }
}

/// Everything the scorer learned about one review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub score: FinalScore,
    pub heuristics: HeuristicMetrics,
    pub meta: MetaEvaluation,
    pub meta_raw: Option<String>,
}

/// Runs heuristics and a bounded meta-evaluation
pub struct Scorer {
    evaluator: Arc<dyn MetaEvaluator>,
    timeout: Duration,
}

impl Scorer {
    pub fn new(evaluator: Arc<dyn MetaEvaluator>, timeout: Duration) -> Self {
        Self { evaluator, timeout }
    }

    /// Score a review; never fails
    pub async fn score(
        &self,
        diff: &str,
        review: &str,
        static_output: &str,
        context: &str,
    ) -> ScoreCard {
        let heuristics = heuristic_metrics(review);

        let (meta, meta_raw) = match tokio::time::timeout(
            self.timeout,
            self.evaluator
                .meta_evaluate(diff, review, static_output, context),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let limit = format_duration(self.timeout);
                warn!(limit = %limit, "Meta evaluation timed out");
                (
                    MetaEvaluation::error(format!("meta evaluation timed out after {}", limit)),
                    None,
                )
            }
        };

        let score = combine_final_score(&heuristics, &meta);
        debug!(
            final_score = score.final_score,
            heuristic_score = score.heuristic_score,
            meta_score = ?score.meta_score,
            "Review scored"
        );

        ScoreCard {
            score,
            heuristics,
            meta,
            meta_raw,
        }
    }
}
