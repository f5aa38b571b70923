//! # Shadow Feature Generation
//!
//! A shadow feature is a within-column random permutation of a real feature:
//! it keeps the column's marginal distribution exactly (same multiset of
//! values) while destroying any association with the label. Each trial gets
//! a fresh shadow copy of every working column, and the pair
//! `[working | shadow]` is what the model is fitted on. Shadow matrices are
//! ephemeral; nothing here survives the trial that produced it.

use ndarray::{Array2, Axis, concatenate};
use rand::Rng;
use rand::seq::SliceRandom;

/// One independently permuted copy of every column of `working`.
///
/// Entropy comes from the run's seeded random source, so a fixed seed yields
/// the same shadow sequence across runs.
pub fn shadow_matrix(working: &Array2<f64>, rng: &mut impl Rng) -> Array2<f64> {
    let mut shadow = working.clone();
    for mut column in shadow.axis_iter_mut(Axis(1)) {
        let mut values: Vec<f64> = column.iter().copied().collect();
        values.shuffle(rng);
        for (slot, value) in column.iter_mut().zip(values) {
            *slot = value;
        }
    }
    shadow
}

/// The horizontally concatenated `[working | shadow]` matrix the model is
/// fitted on. Real columns keep their working order in `0..k`, shadows
/// occupy `k..2k` in the same order.
pub fn augmented_matrix(working: &Array2<f64>, shadow: &Array2<f64>) -> Array2<f64> {
    concatenate![Axis(1), working.view(), shadow.view()]
}
