#![deny(dead_code)]
#![deny(unused_imports)]

//! # Krino: shadow-feature relevance verification
//!
//! Given a labeled dataset, this crate statistically determines which input
//! features carry predictive signal distinguishable from pure noise,
//! producing three disjoint sets, accepted, rejected, and tentative, with
//! a controlled false-discovery rate.
//!
//! Each trial, every working feature gets a shadow copy (a within-column
//! permutation with no real relationship to the label). A model is fitted on
//! the combined matrix, importances are z-scored, and a feature scores a
//! "hit" when it outranks the shadow percentile threshold. Cumulative hits
//! feed a sequential exact binomial test with a Bonferroni correction sized
//! to the shrinking working set; features retire as soon as a direction
//! reaches significance.
//!
//! ```
//! use krino::data::FeatureSet;
//! use krino::forest::RandomForest;
//! use krino::selector::{FeatureSelector, SelectorConfig};
//! use ndarray::{Array1, Array2};
//!
//! // Tiny dataset: the first column is the label made noisy, the second is noise.
//! let n = 60;
//! let x = Array2::from_shape_fn((n, 2), |(r, c)| {
//!     let v = (r as f64 * 0.37).sin();
//!     if c == 0 { v } else { (r as f64 * 1.93).cos() }
//! });
//! let y = Array1::from_shape_fn(n, |r| (r as f64 * 0.37).sin() * 3.0);
//! let features = FeatureSet::new(vec!["signal".into(), "noise".into()], x, y)?;
//!
//! let selector = FeatureSelector::new(SelectorConfig {
//!     n_trials: 10,
//!     ..SelectorConfig::default()
//! })?;
//! let mut model = RandomForest::new().with_n_trees(15);
//! let outcome = selector.run(&mut model, &features)?;
//!
//! let total = outcome.accepted().len() + outcome.rejected().len() + outcome.tentative().len();
//! assert_eq!(total, 2);
//! # Ok::<(), krino::selector::SelectionError>(())
//! ```
//!
//! # Modules
//!
//! - [`data`]: validated datasets and the global/working index spaces
//! - [`shadow`]: shadow matrix generation
//! - [`model`]: the model capability interface
//! - [`forest`], [`linear`]: bundled default models
//! - [`importance`]: importance modes and z-score normalization
//! - [`decision`]: hit accumulation and the sequential binomial tester
//! - [`history`]: the importance record and tentative resolution
//! - [`selector`]: the trial-loop orchestrator
//! - [`stats`]: exact binomial tails and order statistics

pub mod data;
pub mod decision;
pub mod forest;
pub mod history;
pub mod importance;
pub mod linear;
pub mod model;
pub mod selector;
pub mod shadow;
pub mod stats;

pub use data::FeatureSet;
pub use decision::Verdict;
pub use importance::ImportanceMode;
pub use model::{Model, ModelFamily};
pub use selector::{FeatureSelector, SelectionOutcome, SelectorConfig};
