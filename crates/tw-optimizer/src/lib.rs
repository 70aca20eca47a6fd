//! # tw-optimizer
//!
//! The TurboWorks optimization loop.
//!
//! Each iteration records an evaluated point in the ledger, asks a predictor
//! backend (random guess, grid, or the explore/exploit `bayesian` default) for
//! the next candidate over the declared space extended with inferred feature
//! dimensions, optionally swaps out already-evaluated candidates on discrete
//! spaces, and hands the result to a workflow creator.

mod config;
mod discrete;
mod dispatch;
mod infer;
mod registry;
mod search;
mod task;

pub use config::OptConfig;
pub use discrete::{enumerate, space_size, DuplicateGuard};
pub use dispatch::select;
pub use infer::infer_dimensions;
pub use registry::{PredictorRegistry, DEFAULT_PREDICTOR};
pub use search::{
    sample_dimension, sample_space, BayesianSearch, BoxError, FnPredictor, GridSearch, Predictor,
    PredictorResult, RandomGuess,
};
pub use task::{
    FeatureFn, FnFeatures, FnWorkflow, LoopOutcome, LoopStage, OptTask, WorkflowCreator,
};
