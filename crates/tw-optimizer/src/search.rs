//! Predictor backends: the interface a search strategy implements and the
//! built-in strategies.

use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;

use rand::{Rng, RngCore};
use tw_types::{Dimension, Point, Scalar, Space, TwError};

use crate::discrete::enumerate;

/// Error type predictors may return; anything goes, the loop wraps it.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Result of asking a predictor for a candidate.
pub type PredictorResult = Result<Point, BoxError>;

/// A search strategy proposing the next point to evaluate.
///
/// `x` holds the evaluated rows (`x ++ z`), `y` their scores in the same order.
/// Scores are always to be minimized; the loop negates them beforehand when
/// the objective is maximized. The first `declared` dimensions of `space` are
/// the declared inputs, the rest are inferred feature dimensions. The
/// returned point must have one value per dimension of `space`.
pub trait Predictor: Send + Sync {
    fn suggest(
        &self,
        x: &[Point],
        y: &[f64],
        space: &Space,
        declared: usize,
        rng: &mut dyn RngCore,
    ) -> PredictorResult;

    /// Identifier used for registry lookups and error reports.
    fn name(&self) -> &str;

    /// Whether an [`TwError::ExhaustedSpace`] from this backend means the
    /// space is used up rather than that the backend failed.
    fn reports_exhaustion(&self) -> bool {
        false
    }

    /// A copy of this backend tuned to `weight`, for backends with an
    /// exploration knob.
    fn with_exploration_weight(&self, _weight: f64) -> Option<Arc<dyn Predictor>> {
        None
    }
}

/// Draw one value uniformly from a dimension.
pub fn sample_dimension<R: Rng + ?Sized>(dim: &Dimension, rng: &mut R) -> Scalar {
    match dim {
        Dimension::IntRange { low, high } => Scalar::Int(rng.random_range(*low..=*high)),
        Dimension::FloatRange { low, high } => Scalar::Float(rng.random_range(*low..=*high)),
        Dimension::Categorical { values } => {
            let idx = rng.random_range(0..values.len());
            values[idx].clone()
        }
    }
}

/// Draw one point uniformly from a space.
pub fn sample_space<R: Rng + ?Sized>(space: &Space, rng: &mut R) -> Point {
    space.iter().map(|dim| sample_dimension(dim, rng)).collect()
}

// ---- Random guess ----

/// Independent uniform sampling; ignores the history.
#[derive(Debug, Clone, Default)]
pub struct RandomGuess;

impl RandomGuess {
    pub const NAME: &'static str = "random_guess";
}

impl Predictor for RandomGuess {
    fn suggest(
        &self,
        _x: &[Point],
        _y: &[f64],
        space: &Space,
        _declared: usize,
        rng: &mut dyn RngCore,
    ) -> PredictorResult {
        Ok(sample_space(space, rng))
    }

    fn name(&self) -> &str {
        Self::NAME
    }
}

// ---- Grid search ----

/// Walks the declared inputs of a discrete space in enumeration order,
/// proposing the first input not yet in the history. Feature positions are
/// held at the most recent row's values. Spaces whose declared inputs
/// include a float dimension fall back to uniform sampling.
#[derive(Debug, Clone, Default)]
pub struct GridSearch;

impl GridSearch {
    pub const NAME: &'static str = "grid";
}

impl Predictor for GridSearch {
    fn suggest(
        &self,
        x: &[Point],
        _y: &[f64],
        space: &Space,
        declared: usize,
        rng: &mut dyn RngCore,
    ) -> PredictorResult {
        let declared = declared.min(space.len());
        let inputs: Space = space.iter().take(declared).cloned().collect();
        let features: Space = space.iter().skip(declared).cloned().collect();

        if !inputs.is_totally_discrete() {
            return Ok(sample_space(space, rng));
        }

        let seen: HashSet<Point> = x
            .iter()
            .map(|row| row.clone().split_at(declared).0)
            .collect();
        let grid = enumerate(&inputs)?;
        let size = grid.len();
        let next = grid
            .into_iter()
            .find(|p| !seen.contains(p))
            .ok_or(TwError::ExhaustedSpace { size })?;

        let held = match x.last() {
            Some(row) if row.len() == space.len() => row.clone().split_at(declared).1,
            _ => sample_space(&features, rng),
        };
        Ok(next.concat(&held))
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn reports_exhaustion(&self) -> bool {
        true
    }
}

// ---- Bayesian search (surrogate-model stub) ----

/// Explore/exploit heuristic standing in for a surrogate model.
///
/// With probability `exploration_weight` (or when nothing has been evaluated)
/// the point is sampled uniformly. Otherwise the best evaluated row is
/// perturbed: floats by up to 10% of their range, integers by up to 2 steps,
/// categoricals resampled.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    exploration_weight: f64,
}

impl BayesianSearch {
    pub const NAME: &'static str = "bayesian";
    pub const DEFAULT_EXPLORATION_WEIGHT: f64 = 0.3;

    pub fn new(exploration_weight: f64) -> Self {
        Self {
            exploration_weight: exploration_weight.clamp(0.0, 1.0),
        }
    }

    pub fn exploration_weight(&self) -> f64 {
        self.exploration_weight
    }

    /// Perturb the lowest-scoring row; `None` without a usable best row.
    fn exploit<R: Rng + ?Sized>(
        &self,
        x: &[Point],
        y: &[f64],
        space: &Space,
        rng: &mut R,
    ) -> Option<Point> {
        let (best, _) = x
            .iter()
            .zip(y.iter())
            .filter(|(row, score)| row.len() == space.len() && !score.is_nan())
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;

        let perturbed = space
            .iter()
            .zip(best.iter())
            .map(|(dim, base)| match (dim, base.as_f64()) {
                (Dimension::FloatRange { low, high }, Some(v)) => {
                    let noise = rng.random_range(-0.1..0.1) * (high - low);
                    Scalar::Float((v + noise).clamp(*low, *high))
                }
                (Dimension::IntRange { low, high }, _) if base.as_i64().is_some() => {
                    let v = base.as_i64().unwrap_or(*low);
                    let delta: i64 = rng.random_range(-2..=2);
                    Scalar::Int(v.saturating_add(delta).clamp(*low, *high))
                }
                // Fall back to random for choices or mismatched base values
                _ => sample_dimension(dim, rng),
            })
            .collect();

        Some(perturbed)
    }
}

impl Default for BayesianSearch {
    fn default() -> Self {
        Self::new(Self::DEFAULT_EXPLORATION_WEIGHT)
    }
}

impl Predictor for BayesianSearch {
    fn suggest(
        &self,
        x: &[Point],
        y: &[f64],
        space: &Space,
        _declared: usize,
        rng: &mut dyn RngCore,
    ) -> PredictorResult {
        if x.is_empty() || rng.random::<f64>() < self.exploration_weight {
            return Ok(sample_space(space, rng));
        }

        match self.exploit(x, y, space, rng) {
            Some(point) => Ok(point),
            None => Ok(sample_space(space, rng)),
        }
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn with_exploration_weight(&self, weight: f64) -> Option<Arc<dyn Predictor>> {
        Some(Arc::new(Self::new(weight)))
    }
}

// ---- User-supplied functions ----

/// Adapts a plain function into a [`Predictor`] under a chosen name.
pub struct FnPredictor<F> {
    name: String,
    func: F,
}

impl<F> FnPredictor<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Point], &[f64], &Space) -> PredictorResult + Send + Sync,
    {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> std::fmt::Debug for FnPredictor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPredictor").field("name", &self.name).finish()
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(&[Point], &[f64], &Space) -> PredictorResult + Send + Sync,
{
    fn suggest(
        &self,
        x: &[Point],
        y: &[f64],
        space: &Space,
        _declared: usize,
        _rng: &mut dyn RngCore,
    ) -> PredictorResult {
        (self.func)(x, y, space)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mixed_space() -> Space {
        Space::new(vec![
            Dimension::int(5, 15).unwrap(),
            Dimension::float(0.5, 1.0).unwrap(),
            Dimension::categorical(vec!["red", "green", "blue"]).unwrap(),
        ])
    }

    #[test]
    fn random_guess_stays_in_bounds() {
        let space = mixed_space();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let point = RandomGuess.suggest(&[], &[], &space, space.len(), &mut rng).unwrap();
            space.check_point(&point).unwrap();
        }
    }

    #[test]
    fn random_guess_is_reproducible_with_seed() {
        let space = mixed_space();
        let a = RandomGuess
            .suggest(&[], &[], &space, space.len(), &mut StdRng::seed_from_u64(11))
            .unwrap();
        let b = RandomGuess
            .suggest(&[], &[], &space, space.len(), &mut StdRng::seed_from_u64(11))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn grid_walks_unseen_points_in_order() {
        let space = Space::new(vec![Dimension::int(1, 2).unwrap(), Dimension::int(1, 2).unwrap()]);
        let mut rng = StdRng::seed_from_u64(0);

        let first = GridSearch.suggest(&[], &[], &space, space.len(), &mut rng).unwrap();
        assert_eq!(first, Point::from([1, 1]));

        let history = vec![Point::from([1, 1]), Point::from([1, 2])];
        let next = GridSearch.suggest(&history, &[0.0, 0.0], &space, space.len(), &mut rng).unwrap();
        assert_eq!(next, Point::from([2, 1]));
    }

    #[test]
    fn grid_walks_inputs_and_holds_features() {
        // one declared input followed by one inferred feature
        let space = Space::new(vec![Dimension::int(1, 3).unwrap(), Dimension::int(1, 7).unwrap()]);
        let mut rng = StdRng::seed_from_u64(0);

        let history = vec![Point::from([1, 2])];
        let next = GridSearch.suggest(&history, &[0.0], &space, 1, &mut rng).unwrap();
        assert_eq!(next, Point::from([2, 2]));

        let history = vec![Point::from([1, 2]), Point::from([2, 4])];
        let next = GridSearch.suggest(&history, &[0.0, 0.0], &space, 1, &mut rng).unwrap();
        assert_eq!(next, Point::from([3, 4]));

        let history = vec![Point::from([1, 2]), Point::from([2, 4]), Point::from([3, 6])];
        let err = GridSearch
            .suggest(&history, &[0.0, 0.0, 0.0], &space, 1, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TwError>(),
            Some(TwError::ExhaustedSpace { size: 3 })
        ));
    }

    #[test]
    fn grid_reports_exhaustion() {
        let space = Space::new(vec![Dimension::int(1, 1).unwrap()]);
        let mut rng = StdRng::seed_from_u64(0);
        let err = GridSearch
            .suggest(&[Point::from([1])], &[0.0], &space, space.len(), &mut rng)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TwError>(),
            Some(TwError::ExhaustedSpace { size: 1 })
        ));
    }

    #[test]
    fn bayesian_exploits_near_best() {
        let space = Space::new(vec![
            Dimension::int(0, 100).unwrap(),
            Dimension::float(0.0, 10.0).unwrap(),
        ]);
        let history = vec![
            Point::new(vec![Scalar::Int(50), Scalar::Float(5.0)]),
            Point::new(vec![Scalar::Int(90), Scalar::Float(9.0)]),
        ];
        let scores = vec![-3.0, 7.0];
        let backend = BayesianSearch::new(0.0);
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..50 {
            let point = backend.suggest(&history, &scores, &space, space.len(), &mut rng).unwrap();
            space.check_point(&point).unwrap();
            let a = point[0].as_i64().unwrap();
            let b = point[1].as_f64().unwrap();
            assert!((48..=52).contains(&a), "int perturbation too large: {a}");
            assert!((4.0..=6.0).contains(&b), "float perturbation too large: {b}");
        }
    }

    #[test]
    fn bayesian_explores_without_history() {
        let space = mixed_space();
        let backend = BayesianSearch::default();
        assert_eq!(backend.exploration_weight(), 0.3);
        let mut rng = StdRng::seed_from_u64(9);
        let point = backend.suggest(&[], &[], &space, space.len(), &mut rng).unwrap();
        space.check_point(&point).unwrap();
    }

    #[test]
    fn fn_predictor_forwards_arguments() {
        let predictor = FnPredictor::new("first_row", |x: &[Point], _y: &[f64], _space: &Space| {
            x.first().cloned().ok_or_else(|| "no rows".into())
        });
        let mut rng = StdRng::seed_from_u64(0);
        let space = Space::new(vec![Dimension::int(1, 3).unwrap()]);

        assert_eq!(predictor.name(), "first_row");
        let point = predictor
            .suggest(&[Point::from([2])], &[1.0], &space, space.len(), &mut rng)
            .unwrap();
        assert_eq!(point, Point::from([2]));

        let err = predictor.suggest(&[], &[], &space, space.len(), &mut rng).unwrap_err();
        assert_eq!(err.to_string(), "no rows");
    }
}
