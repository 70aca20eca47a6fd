//! Loop configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tw_store::StoreConfig;
use tw_types::{config_error, input_error, Space, TwResult};

use crate::registry::DEFAULT_PREDICTOR;

/// Everything a loop needs besides its collaborators: the declared space,
/// the backend, objective direction, and where trials are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptConfig {
    /// Declared search space for `x`.
    pub dimensions: Space,
    /// Registered predictor name; the default backend when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictor: Option<String>,
    /// Maximize `y` instead of minimizing it.
    #[serde(default)]
    pub max: bool,
    /// Never hand out a point that has already been evaluated (discrete
    /// spaces only).
    #[serde(default)]
    pub duplicate_check: bool,
    /// Positional arguments for the workflow creator; must be an array.
    #[serde(default = "empty_array")]
    pub wf_creator_args: Value,
    /// Keyword arguments for the workflow creator; must be an object.
    #[serde(default = "empty_object")]
    pub wf_creator_kwargs: Value,
    /// Seed for reproducible candidate selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Exploration probability for the `bayesian` backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploration_weight: Option<f64>,
    #[serde(flatten)]
    pub store: StoreConfig,
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl OptConfig {
    pub fn new(dimensions: Space) -> Self {
        Self {
            dimensions,
            predictor: None,
            max: false,
            duplicate_check: false,
            wf_creator_args: empty_array(),
            wf_creator_kwargs: empty_object(),
            seed: None,
            exploration_weight: None,
            store: StoreConfig::default(),
        }
    }

    /// Parse a JSON configuration document.
    pub fn from_json(raw: &str) -> TwResult<Self> {
        let config: OptConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_predictor(mut self, name: impl Into<String>) -> Self {
        self.predictor = Some(name.into());
        self
    }

    pub fn maximize(mut self) -> Self {
        self.max = true;
        self
    }

    pub fn with_duplicate_check(mut self, enabled: bool) -> Self {
        self.duplicate_check = enabled;
        self
    }

    pub fn with_wf_creator_args(mut self, args: Value) -> Self {
        self.wf_creator_args = args;
        self
    }

    pub fn with_wf_creator_kwargs(mut self, kwargs: Value) -> Self {
        self.wf_creator_kwargs = kwargs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_exploration_weight(mut self, weight: f64) -> Self {
        self.exploration_weight = Some(weight);
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn predictor_name(&self) -> &str {
        self.predictor.as_deref().unwrap_or(DEFAULT_PREDICTOR)
    }

    pub fn validate(&self) -> TwResult<()> {
        if self.dimensions.is_empty() {
            return Err(config_error!("The search space has no dimensions"));
        }
        if !self.wf_creator_args.is_array() {
            return Err(input_error!(
                "wf_creator_args should be a list/tuple of positional arguments, got {}",
                self.wf_creator_args
            ));
        }
        if !self.wf_creator_kwargs.is_object() {
            return Err(input_error!(
                "wf_creator_kwargs should be a dictionary of keyword arguments, got {}",
                self.wf_creator_kwargs
            ));
        }
        if let Some(weight) = self.exploration_weight {
            if !(0.0..=1.0).contains(&weight) {
                return Err(config_error!(
                    "exploration_weight must be within [0, 1], got {weight}"
                ));
            }
        }
        Ok(())
    }

    /// Positional and keyword workflow arguments; empty when the containers
    /// have the wrong type (rejected by [`OptConfig::validate`]).
    pub(crate) fn workflow_arguments(&self) -> (Vec<Value>, Map<String, Value>) {
        let args = self.wf_creator_args.as_array().cloned().unwrap_or_default();
        let kwargs = self.wf_creator_kwargs.as_object().cloned().unwrap_or_default();
        (args, kwargs)
    }
}
