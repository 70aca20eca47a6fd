//! The optimization loop: record an evaluation, choose the next candidate,
//! build the follow-up workflow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use tw_store::{Ledger, StoreConnector};
use tw_types::{input_error, CandidateUpdate, Point, Scalar, Space, Trial, TrialId, TwResult};

use crate::config::OptConfig;
use crate::discrete::DuplicateGuard;
use crate::dispatch;
use crate::infer::infer_dimensions;
use crate::registry::PredictorRegistry;
use crate::search::Predictor;

/// Computes the auxiliary feature vector `z` from an input point.
pub trait FeatureFn: Send + Sync {
    fn features(&self, x: &Point) -> TwResult<Point>;
}

/// Builds the workflow that will evaluate the chosen candidate.
pub trait WorkflowCreator: Send + Sync {
    fn create(&self, x: &Point, args: &[Value], kwargs: &Map<String, Value>) -> TwResult<Value>;
}

/// [`FeatureFn`] backed by a closure.
pub struct FnFeatures<F>(F);

impl<F> FnFeatures<F> {
    pub fn new(func: F) -> Self
    where
        F: Fn(&Point) -> Point + Send + Sync,
    {
        Self(func)
    }
}

impl<F> FeatureFn for FnFeatures<F>
where
    F: Fn(&Point) -> Point + Send + Sync,
{
    fn features(&self, x: &Point) -> TwResult<Point> {
        Ok((self.0)(x))
    }
}

/// [`WorkflowCreator`] backed by a closure.
pub struct FnWorkflow<F>(F);

impl<F> FnWorkflow<F> {
    pub fn new(func: F) -> Self
    where
        F: Fn(&Point, &[Value], &Map<String, Value>) -> TwResult<Value> + Send + Sync,
    {
        Self(func)
    }
}

impl<F> WorkflowCreator for FnWorkflow<F>
where
    F: Fn(&Point, &[Value], &Map<String, Value>) -> TwResult<Value> + Send + Sync,
{
    fn create(&self, x: &Point, args: &[Value], kwargs: &Map<String, Value>) -> TwResult<Value> {
        (self.0)(x, args, kwargs)
    }
}

/// Progress of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopStage {
    Start,
    Persisted,
    SpaceBuilt,
    Predicted,
    DuplicateResolved,
    Stored,
    Done,
}

impl std::fmt::Display for LoopStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopStage::Start => "start",
            LoopStage::Persisted => "persisted",
            LoopStage::SpaceBuilt => "space_built",
            LoopStage::Predicted => "predicted",
            LoopStage::DuplicateResolved => "duplicate_resolved",
            LoopStage::Stored => "stored",
            LoopStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// What one iteration produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopOutcome {
    /// Document recording the evaluated point.
    pub trial_id: TrialId,
    pub x_new: Point,
    pub z_new: Point,
    /// The workflow built for `x_new`.
    pub workflow: Value,
}

impl LoopOutcome {
    /// Update handed back to the workflow engine alongside the new workflow.
    pub fn update_spec(&self) -> Value {
        json!({ "optimization_id": self.trial_id.to_string() })
    }
}

/// One optimization loop bound to its ledger, predictor and workflow creator.
///
/// `run` may be called concurrently from several workers against the same
/// ledger.
pub struct OptTask {
    config: OptConfig,
    ledger: Ledger,
    predictor: Arc<dyn Predictor>,
    feature_fn: Option<Arc<dyn FeatureFn>>,
    wf_creator: Arc<dyn WorkflowCreator>,
    guard: Option<DuplicateGuard>,
    iterations: AtomicU64,
}

impl OptTask {
    /// Build a loop over an already opened ledger.
    pub fn new(
        config: OptConfig,
        ledger: Ledger,
        registry: &PredictorRegistry,
        wf_creator: Arc<dyn WorkflowCreator>,
    ) -> TwResult<Self> {
        config.validate()?;

        let mut predictor = registry.resolve(config.predictor_name())?;
        if let Some(weight) = config.exploration_weight {
            match predictor.with_exploration_weight(weight) {
                Some(tuned) => predictor = tuned,
                None => warn!(
                    "Predictor {} has no exploration weight; ignoring {}",
                    predictor.name(),
                    weight
                ),
            }
        }

        let guard = if !config.duplicate_check {
            None
        } else if config.dimensions.is_totally_discrete() {
            Some(DuplicateGuard::new(&config.dimensions)?)
        } else {
            warn!(
                "Duplicate check requested on a space with a float dimension; skipping it for {}",
                ledger.collection()
            );
            None
        };

        info!(
            "Configured optimization on {} with predictor {} ({} dimensions, {})",
            ledger.collection(),
            predictor.name(),
            config.dimensions.len(),
            if config.max { "maximize" } else { "minimize" }
        );

        Ok(Self {
            config,
            ledger,
            predictor,
            feature_fn: None,
            wf_creator,
            guard,
            iterations: AtomicU64::new(0),
        })
    }

    /// Resolve the configured store address and build a loop over it.
    pub fn from_config(
        config: OptConfig,
        connector: &dyn StoreConnector,
        registry: &PredictorRegistry,
        wf_creator: Arc<dyn WorkflowCreator>,
    ) -> TwResult<Self> {
        let address = config.store.resolve()?;
        let ledger = Ledger::new(connector.connect(&address)?);
        Self::new(config, ledger, registry, wf_creator)
    }

    pub fn with_feature_fn(mut self, feature_fn: Arc<dyn FeatureFn>) -> Self {
        self.feature_fn = Some(feature_fn);
        self
    }

    /// Use `predictor` instead of the configured backend.
    pub fn with_predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn config(&self) -> &OptConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn predictor_name(&self) -> &str {
        self.predictor.name()
    }

    /// Best recorded score and the point that produced it, honouring the
    /// objective direction.
    pub fn best(&self) -> TwResult<(Scalar, Point)> {
        self.ledger.extremum_of("y", !self.config.max)
    }

    /// Record the evaluation `(x, y)` and produce the next candidate.
    pub fn run(&self, x: Point, y: f64) -> TwResult<LoopOutcome> {
        let iteration = self.iterations.fetch_add(1, Ordering::Relaxed);
        let mut stage = LoopStage::Start;

        match self.iterate(iteration, x, y, &mut stage) {
            Ok(outcome) => {
                info!(
                    "Iteration {} on {} proposed {} (trial {})",
                    iteration,
                    self.ledger.collection(),
                    outcome.x_new,
                    outcome.trial_id
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(
                    "Iteration {} on {} aborted after stage {}: {}",
                    iteration,
                    self.ledger.collection(),
                    stage,
                    err
                );
                Err(err)
            }
        }
    }

    fn iterate(
        &self,
        iteration: u64,
        x: Point,
        y: f64,
        stage: &mut LoopStage,
    ) -> TwResult<LoopOutcome> {
        let space = &self.config.dimensions;
        space.check_point(&x)?;
        if !y.is_finite() {
            return Err(input_error!("Objective value {y} for {x} is not finite"));
        }

        let z = match &self.feature_fn {
            Some(feature_fn) => feature_fn.features(&x)?,
            None => Point::default(),
        };

        let trial_id = self.ledger.append(&Trial::new(x.clone(), y, z))?;
        self.advance(stage, LoopStage::Persisted);

        let history = self.ledger.all_complete()?;
        let rows: Vec<Point> = history.iter().map(Trial::features).collect();
        let scores: Vec<f64> = history
            .iter()
            .map(|t| if self.config.max { -t.y } else { t.y })
            .collect();
        let combined = self.combined_space(&history)?;
        self.advance(stage, LoopStage::SpaceBuilt);

        let mut rng = self.rng_for(iteration);
        let candidate = dispatch::select(
            self.predictor.as_ref(),
            &rows,
            &scores,
            &combined,
            space.len(),
            &mut rng,
        )?;
        let (mut x_new, z_new) = candidate.split_at(x.len());
        self.advance(stage, LoopStage::Predicted);

        if let Some(guard) = &self.guard {
            let evaluated = self.ledger.evaluated_points()?;
            x_new = guard.resolve(&x_new, &evaluated, &mut rng)?;
            self.advance(stage, LoopStage::DuplicateResolved);
        }

        self.ledger.record_candidate(
            &trial_id,
            &CandidateUpdate {
                x_new: x_new.clone(),
                z_new: z_new.clone(),
            },
        )?;
        self.advance(stage, LoopStage::Stored);

        let (args, kwargs) = self.config.workflow_arguments();
        let workflow = self.wf_creator.create(&x_new, &args, &kwargs)?;
        self.advance(stage, LoopStage::Done);

        Ok(LoopOutcome {
            trial_id,
            x_new,
            z_new,
            workflow,
        })
    }

    /// Declared dimensions, extended with inferred feature dimensions once
    /// any recorded trial carries features.
    fn combined_space(&self, history: &[Trial]) -> TwResult<Space> {
        if history.iter().all(|t| t.z.is_empty()) {
            return Ok(self.config.dimensions.clone());
        }
        let observed: Vec<Point> = history.iter().map(|t| t.z.clone()).collect();
        let z_space = infer_dimensions(&observed)?;
        Ok(self.config.dimensions.concat(&z_space))
    }

    fn rng_for(&self, iteration: u64) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(iteration)),
            None => StdRng::from_os_rng(),
        }
    }

    fn advance(&self, stage: &mut LoopStage, next: LoopStage) {
        debug!("{}: {} -> {}", self.ledger.collection(), stage, next);
        *stage = next;
    }
}

impl std::fmt::Debug for OptTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptTask")
            .field("collection", &self.ledger.collection())
            .field("predictor", &self.predictor.name())
            .field("config", &self.config)
            .finish()
    }
}
