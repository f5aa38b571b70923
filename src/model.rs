//! # Model Capability Interface
//!
//! The verification procedure treats the predictive model as an opaque
//! collaborator: anything that can fit on a feature matrix and predict a
//! label vector can drive a run. Beyond that baseline, two optional
//! capabilities unlock specific importance modes:
//!
//! - intrinsic per-feature importances (impurity mode), and
//! - per-row, per-column attributions (attribution mode).
//!
//! Capabilities are surfaced as `Option`-returning methods with `None`
//! defaults rather than attribute probing; an importance mode finding `None`
//! is a fatal configuration error at first use, never silently skipped.

use ndarray::{Array1, Array2};
use thiserror::Error;

/// The closed set of model families the attribution machinery understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Ensembles of decision trees (forests, boosted trees).
    TreeEnsemble,
    /// Models whose prediction is an affine function of the inputs.
    Linear,
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFamily::TreeEnsemble => write!(f, "tree ensemble"),
            ModelFamily::Linear => write!(f, "linear"),
        }
    }
}

/// Per-row, per-column attribution tables produced by an explaining model.
///
/// Tree classifiers conventionally return one table per class; the scorer
/// uses the first (positive-class) table. Every other combination returns a
/// single table directly.
#[derive(Debug, Clone)]
pub enum Attributions {
    Single(Array2<f64>),
    PerClass(Vec<Array2<f64>>),
}

impl Attributions {
    /// The table the importance scorer consumes: the single table, or the
    /// first per-class table. `None` if a per-class list is empty.
    pub fn primary(&self) -> Option<&Array2<f64>> {
        match self {
            Attributions::Single(table) => Some(table),
            Attributions::PerClass(tables) => tables.first(),
        }
    }
}

/// Errors raised by model fitting.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Cannot fit a model on an empty matrix ({rows} rows x {columns} columns).")]
    EmptyTrainingSet { rows: usize, columns: usize },

    #[error("Model fitting failed: {0}")]
    FitFailed(String),
}

/// The capability interface every driving model must implement.
///
/// `fit` and `predict` are mandatory; `feature_importances` and
/// `attributions` are optional capabilities with `None` defaults. `predict`
/// and `score` are only meaningful after a successful `fit`.
pub trait Model {
    /// Which closed family this model belongs to.
    fn family(&self) -> ModelFamily;

    /// Fits the model to `x` (`n_samples x n_features`) against labels `y`.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError>;

    /// Predicts one value per row of `x`.
    fn predict(&self, x: &Array2<f64>) -> Array1<f64>;

    /// Goodness-of-fit score; higher is better. Defaults to R².
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> f64 {
        r_squared(&self.predict(x), y)
    }

    /// Intrinsic per-feature importances, if the model exposes them.
    /// Required for impurity-mode importance scoring.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }

    /// Per-row attributions over `x`, if the model can explain itself.
    /// Required for attribution-mode importance scoring.
    fn attributions(&self, x: &Array2<f64>) -> Option<Attributions> {
        let _ = x;
        None
    }
}

/// Coefficient of determination of `predicted` against `observed`.
///
/// A constant label vector has no variance to explain; R² is defined as 0
/// there so permutation scoring stays finite.
pub fn r_squared(predicted: &Array1<f64>, observed: &Array1<f64>) -> f64 {
    let mean = observed.mean().unwrap_or(0.0);
    let ss_tot: f64 = observed.iter().map(|y| (y - mean) * (y - mean)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = predicted
        .iter()
        .zip(observed.iter())
        .map(|(p, y)| (y - p) * (y - p))
        .sum();
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn r_squared_is_one_for_perfect_predictions() {
        let y = array![1.0, 2.0, 3.0];
        assert_relative_eq!(r_squared(&y.clone(), &y), 1.0);
    }

    #[test]
    fn r_squared_is_zero_for_mean_prediction() {
        let y = array![1.0, 2.0, 3.0];
        let p = array![2.0, 2.0, 2.0];
        assert_relative_eq!(r_squared(&p, &y), 0.0);
    }

    #[test]
    fn r_squared_handles_constant_labels() {
        let y = array![5.0, 5.0, 5.0];
        let p = array![4.0, 5.0, 6.0];
        assert_relative_eq!(r_squared(&p, &y), 0.0);
    }

    #[test]
    fn per_class_attributions_use_first_table() {
        let a = Attributions::PerClass(vec![array![[1.0]], array![[2.0]]]);
        assert_eq!(a.primary().unwrap()[[0, 0]], 1.0);
        let empty = Attributions::PerClass(vec![]);
        assert!(empty.primary().is_none());
    }
}
