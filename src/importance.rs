//! # Importance Scoring
//!
//! Turns a fitted model plus the augmented `[real | shadow]` matrix into two
//! aligned vectors of z-scored importances: one for the real working columns
//! and one for their shadow counterparts, matched by position.
//!
//! Three modes are supported, as a closed set:
//!
//! - `Attribution`: mean absolute per-column attribution across rows, from
//!   the model's explanation capability;
//! - `Permutation`: mean drop in model score when a column is shuffled,
//!   computed here over the augmented matrix;
//! - `Impurity`: the model's intrinsic per-feature importances.
//!
//! Whatever the backend, the raw absolute importances of all `2k` columns
//! are standardized together (subtract mean, divide by population standard
//! deviation) before the real/shadow split. That shared scale is what makes
//! hit thresholds comparable across trials and across modes. A mode the
//! fitted model cannot serve is a fatal configuration error, not a fallback.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::model::{Model, ModelFamily};
use crate::stats;

/// How raw feature importance is obtained from the fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportanceMode {
    Attribution,
    Permutation,
    Impurity,
}

/// Fatal configuration errors in mode/model pairing or backend output.
#[derive(Error, Debug)]
pub enum ImportanceError {
    #[error(
        "Attribution importance was requested but the {family} model does not expose attributions."
    )]
    AttributionUnsupported { family: ModelFamily },

    #[error(
        "Impurity importance was requested but the {family} model exposes no intrinsic feature importances."
    )]
    ImpurityUnsupported { family: ModelFamily },

    #[error(
        "The importance backend returned {actual} values for a matrix of {expected} columns."
    )]
    LengthMismatch { expected: usize, actual: usize },
}

/// Z-scored importances for one trial, in working column order.
#[derive(Debug, Clone)]
pub struct ImportanceScores {
    /// One z-score per real working column.
    pub real: Array1<f64>,
    /// One z-score per shadow column, position-matched to `real`.
    pub shadow: Array1<f64>,
}

/// Number of per-column shuffles averaged by permutation mode.
const PERMUTATION_REPEATS: usize = 5;

/// Scores every column of the augmented matrix and splits the standardized
/// result into real and shadow halves. `k` is the working column count; the
/// augmented matrix must have exactly `2k` columns.
pub fn score_importances(
    model: &dyn Model,
    augmented: &Array2<f64>,
    labels: &Array1<f64>,
    k: usize,
    mode: ImportanceMode,
    rng: &mut impl Rng,
) -> Result<ImportanceScores, ImportanceError> {
    debug_assert_eq!(augmented.ncols(), 2 * k);
    let raw = match mode {
        ImportanceMode::Attribution => attribution_importance(model, augmented)?,
        ImportanceMode::Permutation => permutation_importance(model, augmented, labels, rng),
        ImportanceMode::Impurity => impurity_importance(model)?,
    };
    if raw.len() != augmented.ncols() {
        return Err(ImportanceError::LengthMismatch {
            expected: augmented.ncols(),
            actual: raw.len(),
        });
    }
    let z = z_score(&raw.mapv(f64::abs));
    Ok(ImportanceScores {
        real: z.slice(ndarray::s![..k]).to_owned(),
        shadow: z.slice(ndarray::s![k..]).to_owned(),
    })
}

fn attribution_importance(
    model: &dyn Model,
    augmented: &Array2<f64>,
) -> Result<Array1<f64>, ImportanceError> {
    let unsupported = || ImportanceError::AttributionUnsupported {
        family: model.family(),
    };
    let attributions = model.attributions(augmented).ok_or_else(unsupported)?;
    let table = attributions.primary().ok_or_else(unsupported)?;
    let mut means = Array1::zeros(table.ncols());
    for (c, column) in table.axis_iter(Axis(1)).enumerate() {
        means[c] = column.iter().map(|v| v.abs()).sum::<f64>() / table.nrows() as f64;
    }
    Ok(means)
}

fn impurity_importance(model: &dyn Model) -> Result<Array1<f64>, ImportanceError> {
    model
        .feature_importances()
        .ok_or_else(|| ImportanceError::ImpurityUnsupported {
            family: model.family(),
        })
}

/// Mean drop in model score over [`PERMUTATION_REPEATS`] shuffles of each
/// column, holding every other column fixed.
pub fn permutation_importance(
    model: &dyn Model,
    x: &Array2<f64>,
    y: &Array1<f64>,
    rng: &mut impl Rng,
) -> Array1<f64> {
    let baseline = model.score(x, y);
    let mut importances = Array1::zeros(x.ncols());
    let mut shuffled = x.clone();
    for c in 0..x.ncols() {
        let original = x.column(c).to_owned();
        let mut drop_sum = 0.0;
        for _ in 0..PERMUTATION_REPEATS {
            let mut values = original.to_vec();
            values.shuffle(rng);
            for (r, v) in values.into_iter().enumerate() {
                shuffled[[r, c]] = v;
            }
            drop_sum += baseline - model.score(&shuffled, y);
        }
        // Restore before moving to the next column.
        for (r, v) in original.iter().enumerate() {
            shuffled[[r, c]] = *v;
        }
        importances[c] = drop_sum / PERMUTATION_REPEATS as f64;
    }
    importances
}

/// Standardizes by population mean and standard deviation. A zero-variance
/// vector maps to all zeros rather than NaN.
fn z_score(values: &Array1<f64>) -> Array1<f64> {
    let slice = values.to_vec();
    let mean = stats::nan_mean(&slice);
    let std = stats::nan_std(&slice);
    if std == 0.0 || !std.is_finite() {
        return Array1::zeros(values.len());
    }
    values.mapv(|v| (v - mean) / std)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::RandomForest;
    use crate::linear::RidgeModel;
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2};
    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Two real columns (first predictive) and two noise "shadow" columns.
    fn augmented_fixture(seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = 150;
        let mut x = Array2::zeros((n, 4));
        let mut y = Array1::zeros(n);
        for r in 0..n {
            let signal: f64 = rng.gen_range(-1.0..1.0);
            x[[r, 0]] = signal;
            for c in 1..4 {
                x[[r, c]] = rng.gen_range(-1.0..1.0);
            }
            y[r] = 4.0 * signal;
        }
        (x, y)
    }

    #[test]
    fn z_scores_have_zero_mean_unit_std() {
        let v = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let z = z_score(&v);
        let slice = z.as_slice().unwrap();
        assert_relative_eq!(stats::nan_mean(slice), 0.0, epsilon = 1e-12);
        assert_relative_eq!(stats::nan_std(slice), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_importances_standardize_to_zero() {
        let v = Array1::from_vec(vec![3.0, 3.0, 3.0]);
        assert_eq!(z_score(&v), Array1::<f64>::zeros(3));
    }

    #[test]
    fn impurity_mode_splits_real_and_shadow() {
        let (x, y) = augmented_fixture(31);
        let mut forest = RandomForest::new().with_n_trees(30).with_seed(3);
        forest.fit(&x, &y).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let scores =
            score_importances(&forest, &x, &y, 2, ImportanceMode::Impurity, &mut rng).unwrap();
        assert_eq!(scores.real.len(), 2);
        assert_eq!(scores.shadow.len(), 2);
        // The predictive column outscores both pseudo-shadows.
        assert!(scores.real[0] > scores.shadow[0]);
        assert!(scores.real[0] > scores.shadow[1]);
    }

    #[test]
    fn permutation_mode_ranks_the_signal_first() {
        let (x, y) = augmented_fixture(32);
        let mut model = RidgeModel::new();
        model.fit(&x, &y).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let scores =
            score_importances(&model, &x, &y, 2, ImportanceMode::Permutation, &mut rng).unwrap();
        assert!(scores.real[0] > scores.real[1]);
        assert!(scores.real[0] > scores.shadow[0]);
    }

    #[test]
    fn attribution_mode_works_for_both_families() {
        let (x, y) = augmented_fixture(33);
        let mut rng = StdRng::seed_from_u64(2);

        let mut linear = RidgeModel::new();
        linear.fit(&x, &y).unwrap();
        let scores =
            score_importances(&linear, &x, &y, 2, ImportanceMode::Attribution, &mut rng).unwrap();
        assert!(scores.real[0] > scores.real[1]);

        let mut forest = RandomForest::new().with_n_trees(25).with_seed(7);
        forest.fit(&x, &y).unwrap();
        let scores =
            score_importances(&forest, &x, &y, 2, ImportanceMode::Attribution, &mut rng).unwrap();
        assert!(scores.real[0] > scores.real[1]);
    }

    #[test]
    fn impurity_mode_on_linear_model_is_a_configuration_error() {
        let (x, y) = augmented_fixture(34);
        let mut model = RidgeModel::new();
        model.fit(&x, &y).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let err = score_importances(&model, &x, &y, 2, ImportanceMode::Impurity, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            ImportanceError::ImpurityUnsupported {
                family: ModelFamily::Linear
            }
        ));
    }
}
