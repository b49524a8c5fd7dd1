//! Combiner: weighted sum of factor scores, clamped to [0,1], with an explanation ordered
//! by contribution.

use crate::model::{FactorScore, ScoreBreakdown};
use crate::scoring::source_weights::clamp01;

/// `factors` must arrive in factor declaration order; that order breaks contribution ties.
pub fn combine(factors: Vec<FactorScore>) -> ScoreBreakdown {
    let raw: f64 = factors.iter().map(|f| f.contribution).sum();
    let total = clamp01(raw);

    let mut order: Vec<&FactorScore> = factors.iter().collect();
    // stable sort keeps declaration order among equal contributions
    order.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
    let explanation = order
        .iter()
        .map(|f| f.reason.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    ScoreBreakdown {
        total,
        factors,
        explanation,
    }
}
