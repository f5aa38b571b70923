//! # Trial Loop Orchestration
//!
//! The selector owns every piece of run state: the working set, hit counts,
//! verdicts, and importance history. It drives the strict per-trial sequence:
//! prune decided features, regenerate shadows, refit the model on the
//! augmented matrix, score importances, append history, accumulate hits, run
//! the sequential test. Trials never overlap; trial `t + 1` observes the
//! fully updated state of trial `t`.
//!
//! A model fit failure aborts the run without retry. The loop also ends
//! early if pruning empties the working set before the configured trial
//! count is reached.

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::data::{DataError, FeatureSet, WorkingSet};
use crate::decision::{HitBoard, SequentialTester, Verdict};
use crate::history::{
    FeatureSummary, ImportanceHistory, feature_summary, resolve_tentative,
};
use crate::importance::{ImportanceError, ImportanceMode, score_importances};
use crate::model::{Model, ModelError};
use crate::shadow::{augmented_matrix, shadow_matrix};

/// Run-level parameters: twenty trials, 0.05 significance, percentile 100
/// (shadow maximum), and pruning on by default.
#[derive(Debug, Clone, Copy)]
pub struct SelectorConfig {
    pub n_trials: usize,
    pub alpha: f64,
    pub percentile: f64,
    pub prune_decided: bool,
    pub seed: u64,
    pub mode: ImportanceMode,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            n_trials: 20,
            alpha: 0.05,
            percentile: 100.0,
            prune_decided: true,
            seed: 0,
            mode: ImportanceMode::Attribution,
        }
    }
}

/// What went wrong inside a trial.
#[derive(Error, Debug)]
pub enum TrialError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Importance(#[from] ImportanceError),
}

/// Everything that can abort a run.
///
/// A trial failure carries the importance history recorded up to the failing
/// trial; the run's verdicts are undefined on failure, but the partial
/// record stays available for diagnostics.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Trial {trial} aborted the run: {source}")]
    TrialFailed {
        trial: usize,
        #[source]
        source: TrialError,
        history: Box<ImportanceHistory>,
    },

    #[error("The significance level must lie strictly between 0 and 1, got {0}.")]
    InvalidSignificance(f64),

    #[error("The shadow percentile must lie in [0, 100], got {0}.")]
    InvalidPercentile(f64),

    #[error("At least one trial is required.")]
    NoTrials,
}

/// The feature-relevance verification procedure.
#[derive(Debug, Clone)]
pub struct FeatureSelector {
    config: SelectorConfig,
}

impl FeatureSelector {
    /// Validates the configuration; bad parameters fail here, before any
    /// data or model is touched.
    pub fn new(config: SelectorConfig) -> Result<Self, SelectionError> {
        if !(config.alpha > 0.0 && config.alpha < 1.0) {
            return Err(SelectionError::InvalidSignificance(config.alpha));
        }
        if !(0.0..=100.0).contains(&config.percentile) {
            return Err(SelectionError::InvalidPercentile(config.percentile));
        }
        if config.n_trials == 0 {
            return Err(SelectionError::NoTrials);
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Runs the full trial loop and returns the final partition with its
    /// complete importance record.
    pub fn run(
        &self,
        model: &mut dyn Model,
        features: &FeatureSet,
    ) -> Result<SelectionOutcome, SelectionError> {
        let k0 = features.n_features();
        log::info!(
            "Starting relevance verification: {} features, {} samples, {} trials.",
            k0,
            features.n_samples(),
            self.config.n_trials
        );

        let mut working = WorkingSet::full(features);
        let mut verdicts = vec![Verdict::Undecided; k0];
        let mut board = HitBoard::new(k0, self.config.percentile);
        let tester = SequentialTester::new(self.config.alpha);
        let mut history = ImportanceHistory::new(k0);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut accepted_log: Vec<usize> = Vec::new();
        let mut rejected_log: Vec<usize> = Vec::new();

        for trial in 1..=self.config.n_trials {
            if self.config.prune_decided {
                working.retain(|g| !verdicts[g].is_terminal());
            }
            if working.is_empty() {
                log::info!(
                    "All features decided after {} trials; stopping early.",
                    trial - 1
                );
                break;
            }

            let shadow = shadow_matrix(working.matrix(), &mut rng);
            let augmented = augmented_matrix(working.matrix(), &shadow);
            if let Err(source) = model.fit(&augmented, features.labels()) {
                return Err(SelectionError::TrialFailed {
                    trial,
                    source: source.into(),
                    history: Box::new(history),
                });
            }
            let scores = match score_importances(
                model,
                &augmented,
                features.labels(),
                working.width(),
                self.config.mode,
                &mut rng,
            ) {
                Ok(scores) => scores,
                Err(source) => {
                    return Err(SelectionError::TrialFailed {
                        trial,
                        source: source.into(),
                        history: Box::new(history),
                    });
                }
            };

            history.record_trial(&scores.real, &scores.shadow, working.global_indices());
            let threshold = board.record_trial(&scores, working.global_indices());
            let decisions = tester.evaluate(
                trial as u64,
                board.counts(),
                working.global_indices(),
                &mut verdicts,
            );

            log::debug!(
                "Trial {}/{}: {} features under test, shadow threshold {:.4}, {} newly accepted, {} newly rejected.",
                trial,
                self.config.n_trials,
                working.width(),
                threshold,
                decisions.newly_accepted.len(),
                decisions.newly_rejected.len()
            );
            accepted_log.extend(decisions.newly_accepted);
            rejected_log.extend(decisions.newly_rejected);
        }

        // Final partition by set difference; any feature that landed in both
        // historical lists through a degenerate tie ends up neither accepted
        // nor rejected.
        let mut accepted: Vec<usize> = accepted_log
            .iter()
            .copied()
            .filter(|g| !rejected_log.contains(g))
            .collect();
        let mut rejected: Vec<usize> = rejected_log
            .iter()
            .copied()
            .filter(|g| !accepted_log.contains(g))
            .collect();
        accepted.sort_unstable();
        accepted.dedup();
        rejected.sort_unstable();
        rejected.dedup();
        let tentative: Vec<usize> = (0..k0)
            .filter(|g| !accepted.contains(g) && !rejected.contains(g))
            .collect();

        log::info!(
            "Run complete: {} accepted, {} rejected, {} tentative.",
            accepted.len(),
            rejected.len(),
            tentative.len()
        );

        Ok(SelectionOutcome {
            names: features.names().to_vec(),
            accepted,
            rejected,
            tentative,
            hits: board.counts().to_vec(),
            history,
        })
    }
}

/// The final partition plus the raw record behind it.
///
/// Accepted, rejected, and tentative are pairwise disjoint and together
/// cover every original feature.
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    names: Vec<String>,
    accepted: Vec<usize>,
    rejected: Vec<usize>,
    tentative: Vec<usize>,
    hits: Vec<u64>,
    history: ImportanceHistory,
}

impl SelectionOutcome {
    /// Accepted features, as global indices in ascending order.
    pub fn accepted(&self) -> &[usize] {
        &self.accepted
    }

    pub fn rejected(&self) -> &[usize] {
        &self.rejected
    }

    pub fn tentative(&self) -> &[usize] {
        &self.tentative
    }

    pub fn accepted_names(&self) -> Vec<&str> {
        self.accepted.iter().map(|&g| self.names[g].as_str()).collect()
    }

    pub fn rejected_names(&self) -> Vec<&str> {
        self.rejected.iter().map(|&g| self.names[g].as_str()).collect()
    }

    pub fn tentative_names(&self) -> Vec<&str> {
        self.tentative.iter().map(|&g| self.names[g].as_str()).collect()
    }

    /// Cumulative hit counts per global feature index.
    pub fn hit_counts(&self) -> &[u64] {
        &self.hits
    }

    /// The full trial-by-trial importance record.
    pub fn history(&self) -> &ImportanceHistory {
        &self.history
    }

    /// Per-feature mean/std importance, sorted highest first.
    pub fn summary(&self) -> Vec<FeatureSummary> {
        feature_summary(&self.history, &self.names)
    }

    /// Applies the one-shot tentative tie-break, reclassifying features the
    /// trial loop left undecided. Terminal verdicts are untouched.
    pub fn resolve_tentative(&mut self) {
        let resolution = resolve_tentative(&self.history, &self.tentative);
        if resolution.newly_accepted.is_empty() && resolution.newly_rejected.is_empty() {
            return;
        }
        log::info!(
            "Tentative resolution: {} promoted to accepted, {} demoted to rejected.",
            resolution.newly_accepted.len(),
            resolution.newly_rejected.len()
        );
        self.tentative.retain(|g| {
            !resolution.newly_accepted.contains(g) && !resolution.newly_rejected.contains(g)
        });
        self.accepted.extend(resolution.newly_accepted);
        self.rejected.extend(resolution.newly_rejected);
        self.accepted.sort_unstable();
        self.rejected.sort_unstable();
    }
}
