//! # Dataset Validation and Feature Indexing
//!
//! This module is the exclusive entry point for user-provided data. It
//! validates a labeled feature matrix once, up front, and establishes the
//! immutable global feature index that every cross-trial structure (hit
//! counts, importance history, verdicts) is keyed by.
//!
//! Two coordinate spaces coexist for the lifetime of a run:
//!
//! - Global space: the position of each feature in the original name list.
//!   Assigned once at construction and never reassigned, even after the
//!   feature is pruned from testing. All cumulative statistics live here.
//! - Working space: the dense column order of the shrinking matrix still
//!   under test. All per-trial computation (shadows, scoring) lives here.
//!
//! [`WorkingSet::global_indices`] is the single translation between the two.
//!
//! Failures here are user-input errors; [`DataError`] is worded to be
//! actionable. Validation happens before any trial runs, so a run either
//! starts on clean data or not at all.

use ndarray::{Array1, Array2, Axis};
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while validating user data, before any trial executes.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("The dataset has no rows. At least one sample is required.")]
    EmptyData,

    #[error("The dataset has no feature columns.")]
    NoFeatures,

    #[error(
        "The matrix has {columns} columns but {names} feature names were provided. Each column needs exactly one name."
    )]
    NameCountMismatch { columns: usize, names: usize },

    #[error(
        "The matrix has {rows} rows but the label vector has {labels} entries. They must match."
    )]
    LabelLengthMismatch { rows: usize, labels: usize },

    #[error("The feature name '{0}' appears more than once. Feature names must be unique.")]
    DuplicateFeatureName(String),

    #[error(
        "Missing values (NaN) were found in '{0}'. This procedure requires complete data with no missing values."
    )]
    MissingValuesFound(String),

    #[error("Non-finite values (Infinity) were found in '{0}'. All data must be finite.")]
    NonFiniteValuesFound(String),
}

/// A validated, immutable dataset: named feature columns plus a label vector.
///
/// Construction performs every data check the run will ever need; afterwards
/// the trial loop treats the contents as trusted. The global index of a
/// feature is its position in `names`, a bijection over the original feature
/// set for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    names: Vec<String>,
    x: Array2<f64>,
    y: Array1<f64>,
}

impl FeatureSet {
    /// Validates and wraps a feature matrix (`n_samples x n_features`),
    /// column names, and a label vector.
    pub fn new(names: Vec<String>, x: Array2<f64>, y: Array1<f64>) -> Result<Self, DataError> {
        if x.nrows() == 0 {
            return Err(DataError::EmptyData);
        }
        if x.ncols() == 0 {
            return Err(DataError::NoFeatures);
        }
        if names.len() != x.ncols() {
            return Err(DataError::NameCountMismatch {
                columns: x.ncols(),
                names: names.len(),
            });
        }
        if y.len() != x.nrows() {
            return Err(DataError::LabelLengthMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(DataError::DuplicateFeatureName(name.clone()));
            }
        }
        for (column, name) in x.axis_iter(Axis(1)).zip(&names) {
            validate_finite(column.iter().copied(), name)?;
        }
        validate_finite(y.iter().copied(), "the label vector")?;
        Ok(Self { names, x, y })
    }

    /// Number of original features (the size of the global index space).
    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    /// Number of samples (rows).
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    /// Feature names in global index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The name of the feature at a global index.
    pub fn name(&self, global_index: usize) -> &str {
        &self.names[global_index]
    }

    /// The label vector.
    pub fn labels(&self) -> &Array1<f64> {
        &self.y
    }

    /// The full original matrix, in global index column order.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.x
    }
}

fn validate_finite(values: impl Iterator<Item = f64>, name: &str) -> Result<(), DataError> {
    for v in values {
        if v.is_nan() {
            return Err(DataError::MissingValuesFound(name.to_string()));
        }
        if v.is_infinite() {
            return Err(DataError::NonFiniteValuesFound(name.to_string()));
        }
    }
    Ok(())
}

/// The shrinking set of columns still under test.
///
/// Mutated only by removal; columns are never added back. Every column keeps
/// its global index alongside it, so results computed in working order can
/// always be mapped back to the fixed global coordinate space.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    columns: Array2<f64>,
    global: Vec<usize>,
}

impl WorkingSet {
    /// A working set covering every feature of the dataset.
    pub fn full(features: &FeatureSet) -> Self {
        Self {
            columns: features.matrix().clone(),
            global: (0..features.n_features()).collect(),
        }
    }

    /// Number of columns still under test.
    pub fn width(&self) -> usize {
        self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
    }

    /// The working matrix, `n_samples x width()`, in working column order.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.columns
    }

    /// Maps working column position -> global feature index.
    pub fn global_indices(&self) -> &[usize] {
        &self.global
    }

    /// Whether the feature with the given global index is still under test.
    pub fn contains_global(&self, global_index: usize) -> bool {
        self.global.contains(&global_index)
    }

    /// Removes every column whose global index fails the predicate.
    pub fn retain(&mut self, keep: impl Fn(usize) -> bool) {
        let kept: Vec<usize> = (0..self.global.len())
            .filter(|&w| keep(self.global[w]))
            .collect();
        if kept.len() == self.global.len() {
            return;
        }
        self.columns = self.columns.select(Axis(1), &kept);
        self.global = kept.into_iter().map(|w| self.global[w]).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_set() -> FeatureSet {
        let x = array![[1.0, 10.0, 100.0], [2.0, 20.0, 200.0], [3.0, 30.0, 300.0]];
        let y = array![0.0, 1.0, 0.0];
        FeatureSet::new(vec!["a".into(), "b".into(), "c".into()], x, y).unwrap()
    }

    #[test]
    fn valid_data_passes() {
        let fs = small_set();
        assert_eq!(fs.n_features(), 3);
        assert_eq!(fs.n_samples(), 3);
        assert_eq!(fs.name(1), "b");
    }

    #[test]
    fn missing_value_is_rejected_with_column_name() {
        let x = array![[1.0, f64::NAN], [2.0, 4.0]];
        let y = array![0.0, 1.0];
        let err = FeatureSet::new(vec!["a".into(), "b".into()], x, y).unwrap_err();
        assert!(matches!(err, DataError::MissingValuesFound(ref c) if c == "b"));
    }

    #[test]
    fn infinite_value_is_rejected() {
        let x = array![[1.0, 2.0], [f64::INFINITY, 4.0]];
        let y = array![0.0, 1.0];
        let err = FeatureSet::new(vec!["a".into(), "b".into()], x, y).unwrap_err();
        assert!(matches!(err, DataError::NonFiniteValuesFound(_)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![0.0, 1.0];
        let err = FeatureSet::new(vec!["a".into(), "a".into()], x, y).unwrap_err();
        assert!(matches!(err, DataError::DuplicateFeatureName(ref n) if n == "a"));
    }

    #[test]
    fn label_mismatch_is_rejected() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![0.0];
        let err = FeatureSet::new(vec!["a".into(), "b".into()], x, y).unwrap_err();
        assert!(matches!(
            err,
            DataError::LabelLengthMismatch { rows: 2, labels: 1 }
        ));
    }

    #[test]
    fn nan_label_is_rejected() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![0.0, f64::NAN];
        let err = FeatureSet::new(vec!["a".into(), "b".into()], x, y).unwrap_err();
        assert!(matches!(err, DataError::MissingValuesFound(_)));
    }

    #[test]
    fn working_set_removal_preserves_global_indices() {
        let fs = small_set();
        let mut ws = WorkingSet::full(&fs);
        assert_eq!(ws.width(), 3);

        ws.retain(|g| g != 1);
        assert_eq!(ws.width(), 2);
        assert_eq!(ws.global_indices(), &[0, 2]);
        assert!(ws.contains_global(2));
        assert!(!ws.contains_global(1));
        // Column data follows its global index.
        assert_eq!(ws.matrix()[[0, 1]], 100.0);

        ws.retain(|g| g != 0);
        assert_eq!(ws.global_indices(), &[2]);
        ws.retain(|_| false);
        assert!(ws.is_empty());
    }
}
