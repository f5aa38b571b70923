//! # Importance History and Tentative Resolution
//!
//! The history is an append-only, trial-indexed table in global feature
//! order: one importance value per original feature per trial, `NaN` for
//! trials after the feature was pruned, plus four summary statistics of each
//! trial's shadow importances (max, min, mean, median). It is the full raw
//! record a downstream reporter needs to render tables or plots without
//! touching run state.
//!
//! The tentative resolver is the post-loop tie-break for features the
//! sequential test never decided. A tentative feature is promoted when the
//! median of its recorded importances strictly exceeds the median of the
//! per-trial shadow maxima. When no tentative feature clears that bar, the
//! entire tentative set is demoted to rejected; when at least one clears it,
//! the rest simply stay tentative. Callers rely on that asymmetry.

use ndarray::Array1;
use serde::Serialize;

use crate::stats;

/// Summary statistics of one trial's shadow importances.
///
/// Computed over the trial's working shadows only, so every field is finite.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ShadowStats {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
}

impl ShadowStats {
    fn from_scores(shadow: &[f64]) -> Self {
        let max = shadow.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = shadow.iter().copied().fold(f64::INFINITY, f64::min);
        Self {
            max,
            min,
            mean: stats::nan_mean(shadow),
            median: stats::nan_median(shadow),
        }
    }
}

/// Append-only record of per-feature importance across trials.
#[derive(Debug, Clone, Serialize)]
pub struct ImportanceHistory {
    n_features: usize,
    rows: Vec<Vec<f64>>,
    shadow_stats: Vec<ShadowStats>,
}

impl ImportanceHistory {
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            rows: Vec::new(),
            shadow_stats: Vec::new(),
        }
    }

    /// Appends one trial: working-order importances are scattered back to
    /// global order, absent (pruned) features get `NaN`.
    pub fn record_trial(
        &mut self,
        real: &Array1<f64>,
        shadow: &Array1<f64>,
        working_global: &[usize],
    ) {
        let mut row = vec![f64::NAN; self.n_features];
        for (w, &global) in working_global.iter().enumerate() {
            row[global] = real[w];
        }
        self.rows.push(row);
        self.shadow_stats.push(ShadowStats::from_scores(&shadow.to_vec()));
    }

    /// Number of recorded trials.
    pub fn n_trials(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// One row per trial, `n_features` wide, NaN where pruned.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Shadow summary statistics, one entry per trial.
    pub fn shadow_stats(&self) -> &[ShadowStats] {
        &self.shadow_stats
    }

    /// The importance of one feature across all trials (NaN where pruned).
    pub fn feature_column(&self, global_index: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[global_index]).collect()
    }

    /// Median of the per-trial shadow maxima; the bar tentative features
    /// must clear.
    pub fn median_max_shadow(&self) -> f64 {
        let maxima: Vec<f64> = self.shadow_stats.iter().map(|s| s.max).collect();
        stats::nan_median(&maxima)
    }
}

/// Outcome of the post-loop tentative tie-break, as global indices.
#[derive(Debug, Default)]
pub struct TentativeResolution {
    pub newly_accepted: Vec<usize>,
    pub newly_rejected: Vec<usize>,
}

/// One-shot tie-break over the features left undecided by the trial loop.
pub fn resolve_tentative(
    history: &ImportanceHistory,
    tentative: &[usize],
) -> TentativeResolution {
    if tentative.is_empty() {
        return TentativeResolution::default();
    }
    let bar = history.median_max_shadow();
    let newly_accepted: Vec<usize> = tentative
        .iter()
        .copied()
        .filter(|&g| stats::nan_median(&history.feature_column(g)) > bar)
        .collect();
    // Nothing promoted means the whole tentative set is demoted; otherwise
    // the remainder stays tentative.
    let newly_rejected = if newly_accepted.is_empty() {
        tentative.to_vec()
    } else {
        Vec::new()
    };
    TentativeResolution {
        newly_accepted,
        newly_rejected,
    }
}

/// Per-feature aggregate of the recorded history, for downstream reporting.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSummary {
    pub name: String,
    pub global_index: usize,
    pub mean_importance: f64,
    pub std_importance: f64,
    pub trials_observed: usize,
}

/// Mean and standard deviation of each feature's recorded importances,
/// sorted by mean importance, highest first.
pub fn feature_summary(history: &ImportanceHistory, names: &[String]) -> Vec<FeatureSummary> {
    let mut summaries: Vec<FeatureSummary> = (0..history.n_features())
        .map(|g| {
            let column = history.feature_column(g);
            let observed = column.iter().filter(|v| !v.is_nan()).count();
            FeatureSummary {
                name: names[g].clone(),
                global_index: g,
                mean_importance: stats::nan_mean(&column),
                std_importance: stats::nan_std(&column),
                trials_observed: observed,
            }
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.mean_importance
            .partial_cmp(&a.mean_importance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    summaries
}
