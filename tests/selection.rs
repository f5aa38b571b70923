use krino::data::{DataError, FeatureSet};
use krino::forest::RandomForest;
use krino::importance::ImportanceMode;
use krino::linear::RidgeModel;
use krino::model::{Attributions, Model, ModelError, ModelFamily};
use krino::selector::{FeatureSelector, SelectionError, SelectorConfig};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Ten features: the first five drive the label, the last five are pure
/// noise with no relationship to it.
fn signal_and_noise_dataset(n_samples: usize, seed: u64) -> FeatureSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let standard = Normal::new(0.0, 1.0).unwrap();
    let jitter = Normal::new(0.0, 0.1).unwrap();

    let x = Array2::from_shape_fn((n_samples, 10), |_| standard.sample(&mut rng));
    let mut y = Array1::zeros(n_samples);
    for r in 0..n_samples {
        let signal: f64 = (0..5).map(|c| x[[r, c]]).sum();
        y[r] = 2.0 * signal + jitter.sample(&mut rng);
    }
    let names = (0..10)
        .map(|i| {
            if i < 5 {
                format!("signal_{i}")
            } else {
                format!("noise_{i}")
            }
        })
        .collect();
    FeatureSet::new(names, x, y).unwrap()
}

fn default_selector(n_trials: usize, mode: ImportanceMode) -> FeatureSelector {
    FeatureSelector::new(SelectorConfig {
        n_trials,
        mode,
        ..SelectorConfig::default()
    })
    .unwrap()
}

#[test]
fn signal_features_are_accepted_and_noise_is_not() {
    let features = signal_and_noise_dataset(300, 42);
    let selector = default_selector(20, ImportanceMode::Impurity);
    let mut model = RandomForest::new().with_n_trees(40).with_seed(7);
    let outcome = selector.run(&mut model, &features).unwrap();

    for name in ["signal_0", "signal_1", "signal_2", "signal_3", "signal_4"] {
        assert!(
            outcome.accepted_names().contains(&name),
            "{name} should be accepted, got accepted = {:?}",
            outcome.accepted_names()
        );
    }
    let accepted_noise = outcome
        .accepted_names()
        .iter()
        .filter(|n| n.starts_with("noise"))
        .count();
    assert!(
        accepted_noise < 3,
        "a majority of noise features must not be accepted"
    );
}

#[test]
fn partition_is_complete_and_disjoint() {
    let features = signal_and_noise_dataset(200, 3);
    let selector = default_selector(12, ImportanceMode::Impurity);
    let mut model = RandomForest::new().with_n_trees(30).with_seed(1);
    let outcome = selector.run(&mut model, &features).unwrap();

    let total = outcome.accepted().len() + outcome.rejected().len() + outcome.tentative().len();
    assert_eq!(total, features.n_features());
    for g in outcome.accepted() {
        assert!(!outcome.rejected().contains(g));
        assert!(!outcome.tentative().contains(g));
    }
    for g in outcome.rejected() {
        assert!(!outcome.tentative().contains(g));
    }
}

#[test]
fn hit_counts_are_bounded_by_the_trial_count() {
    let features = signal_and_noise_dataset(200, 4);
    let n_trials = 15;
    let selector = default_selector(n_trials, ImportanceMode::Impurity);
    let mut model = RandomForest::new().with_n_trees(30).with_seed(2);
    let outcome = selector.run(&mut model, &features).unwrap();

    for &hits in outcome.hit_counts() {
        assert!(hits <= n_trials as u64);
    }
}

#[test]
fn pruned_features_have_contiguous_nan_history_suffixes() {
    let features = signal_and_noise_dataset(250, 5);
    let selector = default_selector(20, ImportanceMode::Impurity);
    let mut model = RandomForest::new().with_n_trees(40).with_seed(3);
    let outcome = selector.run(&mut model, &features).unwrap();

    let history = outcome.history();
    assert!(history.n_trials() >= 1);
    for g in 0..features.n_features() {
        let column = history.feature_column(g);
        // Trial 1 always observes every feature.
        assert!(!column[0].is_nan());
        // Once a feature disappears from the record it never comes back.
        let mut seen_nan = false;
        for v in column {
            if v.is_nan() {
                seen_nan = true;
            } else {
                assert!(!seen_nan, "feature {g} reappeared after being pruned");
            }
        }
    }
    // Decided features must be pruned from later trials.
    for &g in outcome.rejected() {
        let column = history.feature_column(g);
        if history.n_trials() == 20 {
            assert!(
                column.last().unwrap().is_nan(),
                "a feature rejected mid-run must have NaN entries afterwards"
            );
        }
    }
}

#[test]
fn fixed_seed_makes_runs_identical() {
    let features = signal_and_noise_dataset(200, 6);
    let run = || {
        let selector = default_selector(10, ImportanceMode::Impurity);
        let mut model = RandomForest::new().with_n_trees(25).with_seed(9);
        selector.run(&mut model, &features).unwrap()
    };
    let first = run();
    let second = run();
    assert_eq!(first.accepted(), second.accepted());
    assert_eq!(first.rejected(), second.rejected());
    assert_eq!(first.tentative(), second.tentative());
    assert_eq!(first.hit_counts(), second.hit_counts());
}

#[test]
fn missing_values_fail_before_any_trial() {
    let mut x = Array2::from_elem((30, 3), 1.5);
    x[[7, 1]] = f64::NAN;
    let y = Array1::zeros(30);
    let err = FeatureSet::new(vec!["a".into(), "b".into(), "c".into()], x, y).unwrap_err();
    assert!(matches!(err, DataError::MissingValuesFound(ref c) if c == "b"));
}

#[test]
fn a_single_trial_leaves_every_feature_tentative() {
    let features = signal_and_noise_dataset(150, 7);
    let selector = default_selector(1, ImportanceMode::Impurity);
    let mut model = RandomForest::new().with_n_trees(20).with_seed(4);
    let outcome = selector.run(&mut model, &features).unwrap();

    assert!(outcome.accepted().is_empty());
    assert!(outcome.rejected().is_empty());
    assert_eq!(outcome.tentative().len(), features.n_features());
}

#[test]
fn tentative_resolution_empties_the_tentative_set_or_promotes() {
    let features = signal_and_noise_dataset(200, 8);
    // Too few trials to reach significance, so everything stays tentative.
    let selector = default_selector(3, ImportanceMode::Impurity);
    let mut model = RandomForest::new().with_n_trees(30).with_seed(5);
    let mut outcome = selector.run(&mut model, &features).unwrap();
    assert_eq!(outcome.tentative().len(), features.n_features());

    outcome.resolve_tentative();
    let total = outcome.accepted().len() + outcome.rejected().len() + outcome.tentative().len();
    assert_eq!(total, features.n_features());
    // Either nothing cleared the bar (everything rejected) or the features
    // that cleared it were promoted and the rest remain tentative.
    if outcome.accepted().is_empty() {
        assert_eq!(outcome.rejected().len(), features.n_features());
    } else {
        assert!(outcome.rejected().is_empty());
    }
}

#[test]
fn permutation_mode_with_a_linear_model_finds_the_signal() {
    let mut rng = StdRng::seed_from_u64(11);
    let standard = Normal::new(0.0, 1.0).unwrap();
    let n = 250;
    let x = Array2::from_shape_fn((n, 4), |_| standard.sample(&mut rng));
    let mut y = Array1::zeros(n);
    for r in 0..n {
        y[r] = 5.0 * x[[r, 0]];
    }
    let names = vec!["signal".into(), "n1".into(), "n2".into(), "n3".into()];
    let features = FeatureSet::new(names, x, y).unwrap();

    let selector = default_selector(20, ImportanceMode::Permutation);
    let mut model = RidgeModel::new();
    let outcome = selector.run(&mut model, &features).unwrap();

    assert!(outcome.accepted_names().contains(&"signal"));
    assert!(!outcome.accepted_names().contains(&"n1"));
}

#[test]
fn attribution_mode_with_the_forest_finds_the_signal() {
    let features = signal_and_noise_dataset(250, 12);
    let selector = default_selector(20, ImportanceMode::Attribution);
    let mut model = RandomForest::new().with_n_trees(40).with_seed(6);
    let outcome = selector.run(&mut model, &features).unwrap();

    let accepted = outcome.accepted_names();
    let accepted_signals = accepted.iter().filter(|n| n.starts_with("signal")).count();
    assert!(
        accepted_signals >= 4,
        "attribution mode should accept the signal block, got {accepted:?}"
    );
    let accepted_noise = accepted.iter().filter(|n| n.starts_with("noise")).count();
    assert!(accepted_noise < 3);
}

/// Delegates to a forest but refuses to fit from a chosen trial onwards.
struct FlakyModel {
    inner: RandomForest,
    fits: usize,
    fail_at: usize,
}

impl Model for FlakyModel {
    fn family(&self) -> ModelFamily {
        self.inner.family()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        self.fits += 1;
        if self.fits >= self.fail_at {
            return Err(ModelError::FitFailed("synthetic mid-run failure".into()));
        }
        self.inner.fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        self.inner.predict(x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.inner.feature_importances()
    }

    fn attributions(&self, x: &Array2<f64>) -> Option<Attributions> {
        self.inner.attributions(x)
    }
}

#[test]
fn a_failing_trial_aborts_but_preserves_the_partial_history() {
    let features = signal_and_noise_dataset(150, 14);
    let selector = default_selector(10, ImportanceMode::Impurity);
    let mut model = FlakyModel {
        inner: RandomForest::new().with_n_trees(20).with_seed(10),
        fits: 0,
        fail_at: 3,
    };
    let err = selector.run(&mut model, &features).unwrap_err();
    match err {
        SelectionError::TrialFailed { trial, history, .. } => {
            assert_eq!(trial, 3);
            assert_eq!(history.n_trials(), 2);
        }
        other => panic!("expected a trial failure, got {other:?}"),
    }
}

#[test]
fn summary_ranks_signal_features_above_noise() {
    let features = signal_and_noise_dataset(250, 13);
    let selector = default_selector(10, ImportanceMode::Impurity);
    let mut model = RandomForest::new().with_n_trees(40).with_seed(8);
    let outcome = selector.run(&mut model, &features).unwrap();

    let summary = outcome.summary();
    assert_eq!(summary.len(), 10);
    // The top of the ranking should be dominated by signal features.
    let top_signals = summary[..5]
        .iter()
        .filter(|s| s.name.starts_with("signal"))
        .count();
    assert!(top_signals >= 4, "summary head: {:?}", &summary[..5]);
}
