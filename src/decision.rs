//! # Hit Accumulation and Sequential Decisions
//!
//! Each trial, a real feature scores a "hit" when its z-scored importance
//! strictly exceeds the configured percentile of that trial's shadow
//! importances (percentile 100 = the shadow maximum). Hits accumulate in a
//! counter keyed by the immutable global feature index, so counts survive
//! pruning untouched; a pruned feature's count is frozen, never reset.
//!
//! After every trial the sequential tester asks, per feature still under
//! test, whether the cumulative hit count is already incompatible with the
//! coin-flip null. Both one-sided exact binomial tails are tested and a
//! Bonferroni factor equal to the CURRENT working feature count is applied;
//! the correction family deliberately shrinks as features retire. The
//! corrected p-value is compared against the uncorrected significance level
//! with strict `<`; equality is not significant. When a degenerate tie makes
//! both directions significant at once, the reject direction wins: it is
//! evaluated first and a verdict, once set, never changes inside the loop.

use itertools::izip;
use serde::Serialize;

use crate::importance::ImportanceScores;
use crate::stats;

/// The decision state of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Undecided,
    Accepted,
    Rejected,
}

impl Verdict {
    pub fn is_terminal(self) -> bool {
        self != Verdict::Undecided
    }
}

/// Cumulative hit counts over the global feature index space.
#[derive(Debug, Clone)]
pub struct HitBoard {
    counts: Vec<u64>,
    percentile: f64,
}

impl HitBoard {
    /// `percentile` selects the shadow threshold; 100 means the maximum.
    pub fn new(n_features: usize, percentile: f64) -> Self {
        Self {
            counts: vec![0; n_features],
            percentile,
        }
    }

    /// Scores one trial: features whose z-score strictly exceeds the shadow
    /// percentile threshold gain one hit at their global index. Returns the
    /// threshold used, for logging.
    pub fn record_trial(&mut self, scores: &ImportanceScores, working_global: &[usize]) -> f64 {
        let shadow: Vec<f64> = scores.shadow.to_vec();
        let threshold = stats::percentile(&shadow, self.percentile);
        for (&z, &global) in izip!(scores.real.iter(), working_global) {
            if z > threshold {
                self.counts[global] += 1;
            }
        }
        threshold
    }

    /// Cumulative hits per global feature index.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }
}

/// Newly decided features of one trial, as global indices.
#[derive(Debug, Default)]
pub struct TrialDecisions {
    pub newly_accepted: Vec<usize>,
    pub newly_rejected: Vec<usize>,
}

impl TrialDecisions {
    pub fn is_empty(&self) -> bool {
        self.newly_accepted.is_empty() && self.newly_rejected.is_empty()
    }
}

/// The per-trial batch of two-sided binomial tests.
#[derive(Debug, Clone)]
pub struct SequentialTester {
    alpha: f64,
}

impl SequentialTester {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// Tests every working feature after `trial` completed trials (1-based)
    /// and records terminal verdicts. The Bonferroni family size is the
    /// working feature count at the time of the test.
    pub fn evaluate(
        &self,
        trial: u64,
        hits: &[u64],
        working_global: &[usize],
        verdicts: &mut [Verdict],
    ) -> TrialDecisions {
        let family = working_global.len() as f64;
        let mut decisions = TrialDecisions::default();
        for &global in working_global {
            if verdicts[global].is_terminal() {
                continue;
            }
            let x = hits[global];
            let p_reject = stats::binom_tail_lower(x, trial, 0.5) * family;
            if p_reject < self.alpha {
                verdicts[global] = Verdict::Rejected;
                decisions.newly_rejected.push(global);
                continue;
            }
            let p_accept = stats::binom_tail_upper(x, trial, 0.5) * family;
            if p_accept < self.alpha {
                verdicts[global] = Verdict::Accepted;
                decisions.newly_accepted.push(global);
            }
        }
        decisions
    }
}
