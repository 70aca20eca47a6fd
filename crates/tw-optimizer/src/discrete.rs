//! Enumeration of finite spaces and duplicate avoidance.

use std::collections::HashSet;

use rand::Rng;
use tw_types::{domain_error, Point, Scalar, Space, TwError, TwResult};

/// Number of points in a totally discrete space; `None` for infinite spaces
/// or sizes that overflow `usize`.
pub fn space_size(space: &Space) -> Option<usize> {
    space
        .iter()
        .try_fold(1usize, |total, dim| total.checked_mul(dim.cardinality()?))
}

/// Every point of a totally discrete space, as the Cartesian product of the
/// dimensions in declared order (last dimension varies fastest).
///
/// Fails with a domain error when any dimension is a float range. The result
/// is not capped; bounding the space size is the caller's job.
pub fn enumerate(space: &Space) -> TwResult<Vec<Point>> {
    let mut axes: Vec<Vec<Scalar>> = Vec::with_capacity(space.len());
    for (idx, dim) in space.iter().enumerate() {
        let values = dim.values().ok_or_else(|| {
            domain_error!("Dimension {idx} {dim} is a float range, the space is not finite")
        })?;
        axes.push(values);
    }

    // Cartesian product
    let mut result: Vec<Vec<Scalar>> = vec![Vec::new()];
    for axis in &axes {
        let mut next = Vec::with_capacity(result.len() * axis.len());
        for existing in &result {
            for value in axis {
                let mut combo = existing.clone();
                combo.push(value.clone());
                next.push(combo);
            }
        }
        result = next;
    }

    Ok(result.into_iter().map(Point::new).collect())
}

/// Substitutes a never-evaluated point when the predictor proposes one that
/// has already been run.
///
/// The enumeration of the space is computed once, when the guard is built.
#[derive(Debug, Clone)]
pub struct DuplicateGuard {
    universe: Vec<Point>,
}

impl DuplicateGuard {
    pub fn new(space: &Space) -> TwResult<Self> {
        Ok(Self {
            universe: enumerate(space)?,
        })
    }

    pub fn space_size(&self) -> usize {
        self.universe.len()
    }

    /// Return `candidate` if it has not been evaluated, otherwise a uniformly
    /// random point that has not. Errors once every point is in `history`.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        candidate: &Point,
        history: &[Point],
        rng: &mut R,
    ) -> TwResult<Point> {
        let seen: HashSet<&Point> = history.iter().collect();
        let available: Vec<&Point> =
            self.universe.iter().filter(|p| !seen.contains(p)).collect();

        if available.is_empty() {
            return Err(TwError::ExhaustedSpace {
                size: self.universe.len(),
            });
        }

        if available.contains(&candidate) {
            return Ok(candidate.clone());
        }

        let replacement = available[rng.random_range(0..available.len())].clone();
        tracing::debug!(
            "Candidate {} was already evaluated, substituting {} ({} unevaluated points)",
            candidate,
            replacement,
            available.len()
        );
        Ok(replacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tw_types::Dimension;

    fn int_space(bounds: &[(i64, i64)]) -> Space {
        bounds
            .iter()
            .map(|(low, high)| Dimension::int(*low, *high).unwrap())
            .collect()
    }

    #[test]
    fn enumeration_count_matches_space_size() {
        let space = Space::new(vec![
            Dimension::int(1, 3).unwrap(),
            Dimension::int(10, 11).unwrap(),
            Dimension::categorical(vec!["red", "blue"]).unwrap(),
        ]);
        assert_eq!(space_size(&space), Some(12));

        let points = enumerate(&space).unwrap();
        assert_eq!(points.len(), 12);
        assert!(points.iter().all(|p| p.len() == 3));

        let distinct: HashSet<&Point> = points.iter().collect();
        assert_eq!(distinct.len(), 12);
    }

    #[test]
    fn enumeration_order_last_dimension_fastest() {
        let space = Space::new(vec![
            Dimension::int(1, 2).unwrap(),
            Dimension::categorical(vec!["red", "blue"]).unwrap(),
        ]);
        let points = enumerate(&space).unwrap();
        assert_eq!(
            points,
            vec![
                Point::from(vec![Scalar::Int(1), Scalar::from("red")]),
                Point::from(vec![Scalar::Int(1), Scalar::from("blue")]),
                Point::from(vec![Scalar::Int(2), Scalar::from("red")]),
                Point::from(vec![Scalar::Int(2), Scalar::from("blue")]),
            ]
        );
    }

    #[test]
    fn single_dimension_wraps_values() {
        let points = enumerate(&int_space(&[(1, 3)])).unwrap();
        assert_eq!(points, vec![Point::from([1]), Point::from([2]), Point::from([3])]);
    }

    #[test]
    fn enumeration_is_idempotent() {
        let space = int_space(&[(0, 2), (5, 6)]);
        assert_eq!(enumerate(&space).unwrap(), enumerate(&space).unwrap());
        assert_eq!(space.is_totally_discrete(), space.is_totally_discrete());
    }

    #[test]
    fn float_dimension_is_not_finite() {
        let space = Space::new(vec![
            Dimension::int(1, 3).unwrap(),
            Dimension::float(0.0, 1.0).unwrap(),
        ]);
        assert_eq!(space_size(&space), None);
        assert!(matches!(enumerate(&space), Err(TwError::Domain(_))));
        assert!(matches!(DuplicateGuard::new(&space), Err(TwError::Domain(_))));
    }

    #[test]
    fn guard_keeps_fresh_candidate() {
        let guard = DuplicateGuard::new(&int_space(&[(1, 5)])).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let resolved = guard.resolve(&Point::from([3]), &[], &mut rng).unwrap();
        assert_eq!(resolved, Point::from([3]));
    }

    #[test]
    fn guard_substitutes_only_remaining_point() {
        let guard = DuplicateGuard::new(&int_space(&[(1, 2)])).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let resolved = guard
            .resolve(&Point::from([1]), &[Point::from([1])], &mut rng)
            .unwrap();
        assert_eq!(resolved, Point::from([2]));
    }

    #[test]
    fn guard_fails_on_exhausted_space() {
        let guard = DuplicateGuard::new(&int_space(&[(1, 1)])).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let result = guard.resolve(&Point::from([1]), &[Point::from([1])], &mut rng);
        assert!(matches!(result, Err(TwError::ExhaustedSpace { size: 1 })));
    }

    #[test]
    fn guard_never_returns_history_points() {
        let space = int_space(&[(1, 3), (1, 3)]);
        let guard = DuplicateGuard::new(&space).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut history: Vec<Point> = Vec::new();

        for _ in 0..9 {
            let resolved = guard
                .resolve(&Point::from([1, 1]), &history, &mut rng)
                .unwrap();
            assert!(!history.contains(&resolved));
            history.push(resolved);
        }

        assert!(matches!(
            guard.resolve(&Point::from([1, 1]), &history, &mut rng),
            Err(TwError::ExhaustedSpace { size: 9 })
        ));
    }

    #[test]
    fn guard_treats_numerically_equal_values_as_duplicates() {
        let guard = DuplicateGuard::new(&int_space(&[(1, 2)])).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let history = vec![Point::new(vec![Scalar::Float(1.0)])];
        let resolved = guard.resolve(&Point::from([1]), &history, &mut rng).unwrap();
        assert_eq!(resolved, Point::from([2]));
    }
}
