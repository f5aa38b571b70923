//! # Bundled Ridge Model
//!
//! A linear-family collaborator: L2-regularized least squares fitted by
//! normal equations with an in-crate Cholesky solve. The ridge term keeps
//! the system positive definite even on the augmented `[real | shadow]`
//! matrices, where a shadow column can be nearly collinear with its source.
//!
//! Attributions follow the independent-feature linear convention: the
//! attribution of feature `j` on row `i` is `coef_j * (x_ij - mean_j)`, so
//! attributions sum to the prediction's offset from the training mean. The
//! model exposes no intrinsic importances; selecting impurity mode against
//! it is a configuration error by design.

use ndarray::{Array1, Array2, Axis};

use crate::model::{Attributions, Model, ModelError, ModelFamily};

#[derive(Debug, Clone)]
pub struct RidgeModel {
    alpha: f64,
    coef: Option<Array1<f64>>,
    intercept: f64,
    feature_means: Option<Array1<f64>>,
}

impl Default for RidgeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl RidgeModel {
    pub fn new() -> Self {
        Self {
            alpha: 1e-3,
            coef: None,
            intercept: 0.0,
            feature_means: None,
        }
    }

    /// L2 penalty strength. Must be positive to guarantee a solvable system.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha.max(f64::MIN_POSITIVE);
        self
    }

    /// Fitted coefficients, one per feature.
    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coef.as_ref()
    }
}

impl Model for RidgeModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::Linear
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(ModelError::EmptyTrainingSet {
                rows: n_rows,
                columns: n_features,
            });
        }
        let feature_means = x
            .mean_axis(Axis(0))
            .expect("non-empty matrix has column means");
        let y_mean = y.mean().unwrap_or(0.0);

        let centered = x - &feature_means;
        let centered_y = y.mapv(|v| v - y_mean);

        // Normal equations: (Xc' Xc + alpha I) w = Xc' yc
        let mut gram = centered.t().dot(&centered);
        for d in 0..n_features {
            gram[[d, d]] += self.alpha;
        }
        let rhs = centered.t().dot(&centered_y);
        let coef = cholesky_solve(&gram, &rhs).ok_or_else(|| {
            ModelError::FitFailed("the ridge normal equations are not positive definite".into())
        })?;

        self.intercept = y_mean - feature_means.dot(&coef);
        self.coef = Some(coef);
        self.feature_means = Some(feature_means);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        match &self.coef {
            Some(coef) => x.dot(coef) + self.intercept,
            None => Array1::zeros(x.nrows()),
        }
    }

    fn attributions(&self, x: &Array2<f64>) -> Option<Attributions> {
        let coef = self.coef.as_ref()?;
        let means = self.feature_means.as_ref()?;
        if x.ncols() != coef.len() {
            return None;
        }
        let mut table = Array2::zeros(x.dim());
        for r in 0..x.nrows() {
            for c in 0..x.ncols() {
                table[[r, c]] = coef[c] * (x[[r, c]] - means[c]);
            }
        }
        Some(Attributions::Single(table))
    }
}

/// Solves `a * x = b` for symmetric positive definite `a` via Cholesky
/// decomposition. Returns `None` if a non-positive pivot appears.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut lower = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= lower[[i, k]] * lower[[j, k]];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                lower[[i, j]] = sum.sqrt();
            } else {
                lower[[i, j]] = sum / lower[[j, j]];
            }
        }
    }
    // Forward substitution: L z = b
    let mut z = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= lower[[i, k]] * z[k];
        }
        z[i] = sum / lower[[i, i]];
    }
    // Back substitution: L' x = z
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in i + 1..n {
            sum -= lower[[k, i]] * x[k];
        }
        x[i] = sum / lower[[i, i]];
    }
    Some(x)
}
