//! Name-based lookup of predictor backends.

use std::collections::HashMap;
use std::sync::Arc;

use tw_types::{config_error, TwResult};

use crate::search::{BayesianSearch, GridSearch, Predictor, RandomGuess};

/// Backend used when a loop configuration names none.
pub const DEFAULT_PREDICTOR: &str = BayesianSearch::NAME;

/// Maps predictor names to backends. Names are resolved when a loop is
/// configured, so a typo fails at construction rather than mid-run.
#[derive(Clone)]
pub struct PredictorRegistry {
    predictors: HashMap<String, Arc<dyn Predictor>>,
}

impl PredictorRegistry {
    /// A registry with no backends at all.
    pub fn empty() -> Self {
        Self {
            predictors: HashMap::new(),
        }
    }

    /// The built-in backends: `random_guess`, `grid` and `bayesian`.
    pub fn with_builtins() -> Self {
        Self::empty()
            .with(Arc::new(RandomGuess))
            .with(Arc::new(GridSearch))
            .with(Arc::new(BayesianSearch::default()))
    }

    pub fn with(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.register(predictor);
        self
    }

    /// Register a backend under its own name, replacing any previous one.
    pub fn register(&mut self, predictor: Arc<dyn Predictor>) {
        let name = predictor.name().to_string();
        if self.predictors.insert(name.clone(), predictor).is_some() {
            tracing::debug!("Replaced predictor {}", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predictors.contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> TwResult<Arc<dyn Predictor>> {
        self.predictors.get(name).cloned().ok_or_else(|| {
            config_error!(
                "Unknown predictor {name:?}; registered predictors are {:?}",
                self.names()
            )
        })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.predictors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PredictorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for PredictorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictorRegistry")
            .field("predictors", &self.names())
            .finish()
    }
}
