//! Invocation of a predictor backend with failure isolation.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use rand::RngCore;
use tw_types::{Point, Space, TwError, TwResult};

use crate::search::Predictor;

/// Ask `predictor` for the next candidate over `space`.
///
/// Errors and panics raised by the backend come back as
/// [`TwError::Predictor`] naming the backend. Exhaustion of a discrete space
/// is passed through unchanged only from backends that report it
/// ([`Predictor::reports_exhaustion`]). A returned point that does not fit
/// `space` is also reported as a predictor error.
pub fn select(
    predictor: &dyn Predictor,
    x: &[Point],
    y: &[f64],
    space: &Space,
    declared: usize,
    rng: &mut dyn RngCore,
) -> TwResult<Point> {
    let backend = predictor.name().to_string();
    tracing::debug!(
        "Dispatching {} observations over {} dimensions to predictor {}",
        x.len(),
        space.len(),
        backend
    );

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| predictor.suggest(x, y, space, declared, rng)));

    let point = match outcome {
        Ok(Ok(point)) => point,
        Ok(Err(err)) => {
            return Err(match err.downcast::<TwError>() {
                Ok(inner)
                    if predictor.reports_exhaustion()
                        && matches!(*inner, TwError::ExhaustedSpace { .. }) =>
                {
                    *inner
                }
                Ok(inner) => TwError::predictor(&backend, inner),
                Err(other) => TwError::predictor(&backend, other),
            })
        }
        Err(payload) => {
            return Err(TwError::predictor(
                &backend,
                format!("panicked: {}", panic_message(payload.as_ref())),
            ))
        }
    };

    space
        .check_point(&point)
        .map_err(|e| TwError::predictor(&backend, format!("returned an invalid point: {e}")))?;

    Ok(point)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{FnPredictor, GridSearch, RandomGuess};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tw_types::Dimension;

    fn space() -> Space {
        Space::new(vec![Dimension::int(1, 5).unwrap()])
    }

    #[test]
    fn valid_point_is_returned() {
        let mut rng = StdRng::seed_from_u64(1);
        let point = select(&RandomGuess, &[], &[], &space(), 1, &mut rng).unwrap();
        space().check_point(&point).unwrap();
    }

    #[test]
    fn backend_error_is_wrapped() {
        let failing = FnPredictor::new("my_module.my_predictor", |_: &[Point], _: &[f64], _: &Space| {
            Err("division by zero".into())
        });
        let mut rng = StdRng::seed_from_u64(1);
        match select(&failing, &[], &[], &space(), 1, &mut rng) {
            Err(TwError::Predictor { backend, message }) => {
                assert_eq!(backend, "my_module.my_predictor");
                assert!(message.contains("division by zero"));
            }
            other => panic!("expected predictor error, got {other:?}"),
        }
    }

    #[test]
    fn backend_panic_is_wrapped() {
        let panicking = FnPredictor::new("unstable", |_: &[Point], _: &[f64], _: &Space| {
            panic!("singular matrix")
        });
        let mut rng = StdRng::seed_from_u64(1);
        match select(&panicking, &[], &[], &space(), 1, &mut rng) {
            Err(TwError::Predictor { backend, message }) => {
                assert_eq!(backend, "unstable");
                assert!(message.contains("singular matrix"));
            }
            other => panic!("expected predictor error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_point_is_rejected() {
        let wrong_length = FnPredictor::new("wrong_length", |_: &[Point], _: &[f64], _: &Space| {
            Ok(Point::from([1, 2]))
        });
        let out_of_range = FnPredictor::new("out_of_range", |_: &[Point], _: &[f64], _: &Space| {
            Ok(Point::from([9]))
        });
        let mut rng = StdRng::seed_from_u64(1);

        assert!(matches!(
            select(&wrong_length, &[], &[], &space(), 1, &mut rng),
            Err(TwError::Predictor { .. })
        ));
        assert!(matches!(
            select(&out_of_range, &[], &[], &space(), 1, &mut rng),
            Err(TwError::Predictor { .. })
        ));
    }

    #[test]
    fn custom_exhaustion_is_wrapped() {
        let custom = FnPredictor::new("my_module.enumerator", |_: &[Point], _: &[f64], _: &Space| {
            Err(TwError::ExhaustedSpace { size: 5 }.into())
        });
        let mut rng = StdRng::seed_from_u64(1);
        match select(&custom, &[], &[], &space(), 1, &mut rng) {
            Err(TwError::Predictor { backend, message }) => {
                assert_eq!(backend, "my_module.enumerator");
                assert!(message.contains("exhausted"));
            }
            other => panic!("expected predictor error, got {other:?}"),
        }
    }

    #[test]
    fn exhaustion_passes_through() {
        let space = Space::new(vec![Dimension::int(1, 1).unwrap()]);
        let mut rng = StdRng::seed_from_u64(1);
        let result = select(&GridSearch, &[Point::from([1])], &[0.0], &space, 1, &mut rng);
        assert!(matches!(result, Err(TwError::ExhaustedSpace { size: 1 })));
    }
}
