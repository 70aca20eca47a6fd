//! Dimension inference for feature vectors (`z`), which have no declared
//! bounds.

use tw_types::{input_error, Dimension, Point, Scalar, Space, TwResult};

/// Per-position summary of the observed values.
#[derive(Debug, Clone)]
enum Observed {
    Int { low: i64, high: i64 },
    Float { low: f64, high: f64 },
    Labels(Vec<Scalar>),
}

impl Observed {
    fn start(value: &Scalar) -> TwResult<Self> {
        Ok(match value {
            Scalar::Int(v) => Observed::Int { low: *v, high: *v },
            Scalar::Float(v) => {
                check_finite(*v)?;
                Observed::Float { low: *v, high: *v }
            }
            Scalar::Label(_) => Observed::Labels(vec![value.clone()]),
        })
    }

    fn absorb(self, value: &Scalar) -> TwResult<Self> {
        Ok(match (self, value) {
            (Observed::Labels(mut seen), v) => {
                if !seen.contains(v) {
                    seen.push(v.clone());
                }
                Observed::Labels(seen)
            }
            (Observed::Int { low, high }, Scalar::Int(v)) => Observed::Int {
                low: low.min(*v),
                high: high.max(*v),
            },
            (Observed::Int { low, high }, Scalar::Float(v)) => {
                check_finite(*v)?;
                Observed::Float {
                    low: (low as f64).min(*v),
                    high: (high as f64).max(*v),
                }
            }
            (Observed::Float { low, high }, v) => {
                let v = v.as_f64().unwrap_or(low);
                check_finite(v)?;
                Observed::Float {
                    low: low.min(v),
                    high: high.max(v),
                }
            }
            // labels are caught before folding
            (numeric, Scalar::Label(_)) => numeric,
        })
    }

    fn into_dimension(self) -> TwResult<Dimension> {
        match self {
            Observed::Int { low, high } if low == high => {
                Dimension::int(low.saturating_sub(1), high.saturating_add(1))
            }
            Observed::Int { low, high } => Dimension::int(low, high),
            Observed::Float { low, high } if low == high => {
                let (a, b) = (low - 0.05 * low, high + 0.05 * high);
                Dimension::float(a.min(b), a.max(b))
            }
            Observed::Float { low, high } => Dimension::float(low, high),
            Observed::Labels(values) => Dimension::categorical(values),
        }
    }
}

/// Fold one position across every observation. A label anywhere makes the
/// position categorical over every distinct value seen, numbers included.
fn fold_position(observed: &[Point], position: usize) -> TwResult<Dimension> {
    let categorical = observed.iter().any(|p| p[position].as_label().is_some());

    let mut values = observed.iter().map(|p| &p[position]);
    let first = values
        .next()
        .ok_or_else(|| input_error!("Cannot infer dimensions without observations"))?;

    let summary = if categorical {
        values.try_fold(Observed::Labels(vec![first.clone()]), |acc, v| acc.absorb(v))?
    } else {
        values.try_fold(Observed::start(first)?, |acc, v| acc.absorb(v))?
    };
    summary.into_dimension()
}

fn check_finite(v: f64) -> TwResult<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(input_error!("Feature value {v} is not finite"))
    }
}

/// Infer one dimension per position from every observed feature vector.
///
/// Numeric positions become integer or float ranges spanning the observed
/// values; a position where a label was seen becomes a categorical of the
/// distinct values in first-seen order. Degenerate numeric ranges (a single
/// distinct value, always the case with one observation) are widened by one
/// for integers and by 5% of the value for floats.
pub fn infer_dimensions(observed: &[Point]) -> TwResult<Space> {
    let first = observed
        .first()
        .ok_or_else(|| input_error!("Cannot infer dimensions without observations"))?;
    let width = first.len();

    for (row, point) in observed.iter().enumerate().skip(1) {
        if point.len() != width {
            return Err(input_error!(
                "Feature vector {row} has {} values, expected {width}",
                point.len()
            ));
        }
    }

    let dimensions = (0..width)
        .map(|position| fold_position(observed, position))
        .collect::<TwResult<Vec<_>>>()?;

    tracing::debug!(
        "Inferred {} feature dimensions from {} observations",
        dimensions.len(),
        observed.len()
    );

    Ok(Space::new(dimensions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_types::TwError;

    #[test]
    fn single_observation_is_widened() {
        let space = infer_dimensions(&[Point::new(vec![
            Scalar::Int(10),
            Scalar::Float(2.0),
            Scalar::from("red"),
        ])])
        .unwrap();

        assert_eq!(space.dimensions()[0], Dimension::IntRange { low: 9, high: 11 });
        match &space.dimensions()[1] {
            Dimension::FloatRange { low, high } => {
                assert!((low - 1.9).abs() < 1e-12);
                assert!((high - 2.1).abs() < 1e-12);
            }
            other => panic!("expected float range, got {other}"),
        }
        assert_eq!(
            space.dimensions()[2],
            Dimension::Categorical {
                values: vec![Scalar::from("red")]
            }
        );
    }

    #[test]
    fn negative_float_bounds_are_ordered() {
        let space = infer_dimensions(&[Point::from([-4.0])]).unwrap();
        match &space.dimensions()[0] {
            Dimension::FloatRange { low, high } => {
                assert!((low + 4.2).abs() < 1e-12);
                assert!((high + 3.8).abs() < 1e-12);
            }
            other => panic!("expected float range, got {other}"),
        }
    }

    #[test]
    fn ranges_span_observations() {
        let observed = vec![
            Point::new(vec![Scalar::Int(3), Scalar::Float(0.5), Scalar::from("a")]),
            Point::new(vec![Scalar::Int(-1), Scalar::Float(2.5), Scalar::from("b")]),
            Point::new(vec![Scalar::Int(7), Scalar::Float(1.0), Scalar::from("a")]),
        ];
        let space = infer_dimensions(&observed).unwrap();

        assert_eq!(space.dimensions()[0], Dimension::IntRange { low: -1, high: 7 });
        assert_eq!(space.dimensions()[1], Dimension::FloatRange { low: 0.5, high: 2.5 });
        assert_eq!(
            space.dimensions()[2],
            Dimension::Categorical {
                values: vec![Scalar::from("a"), Scalar::from("b")]
            }
        );
        for point in &observed {
            space.check_point(point).unwrap();
        }
    }

    #[test]
    fn mixed_int_and_float_promotes_to_float() {
        let observed = vec![Point::from([1]), Point::from([2.5])];
        let space = infer_dimensions(&observed).unwrap();
        assert_eq!(space.dimensions()[0], Dimension::FloatRange { low: 1.0, high: 2.5 });
    }

    #[test]
    fn identical_observations_are_widened() {
        let observed = vec![Point::from([4]), Point::from([4])];
        let space = infer_dimensions(&observed).unwrap();
        assert_eq!(space.dimensions()[0], Dimension::IntRange { low: 3, high: 5 });
    }

    #[test]
    fn labels_make_position_categorical() {
        let observed = vec![
            Point::new(vec![Scalar::from("red")]),
            Point::new(vec![Scalar::from("blue")]),
            Point::new(vec![Scalar::from("red")]),
        ];
        let space = infer_dimensions(&observed).unwrap();
        assert_eq!(
            space.dimensions()[0],
            Dimension::Categorical {
                values: vec![Scalar::from("red"), Scalar::from("blue")]
            }
        );
    }

    #[test]
    fn numbers_mixed_with_labels_become_choices() {
        let observed = vec![
            Point::new(vec![Scalar::Int(1)]),
            Point::new(vec![Scalar::Int(3)]),
            Point::new(vec![Scalar::Int(2)]),
            Point::new(vec![Scalar::from("none")]),
        ];
        let space = infer_dimensions(&observed).unwrap();
        assert_eq!(
            space.dimensions()[0],
            Dimension::Categorical {
                values: vec![Scalar::Int(1), Scalar::Int(3), Scalar::Int(2), Scalar::from("none")]
            }
        );
        for point in &observed {
            space.check_point(point).unwrap();
        }
    }

    #[test]
    fn empty_and_ragged_input_is_rejected() {
        assert!(matches!(infer_dimensions(&[]), Err(TwError::Input(_))));

        let ragged = vec![Point::from([1, 2]), Point::from([1])];
        assert!(matches!(infer_dimensions(&ragged), Err(TwError::Input(_))));
    }

    #[test]
    fn empty_feature_vectors_infer_empty_space() {
        let space = infer_dimensions(&[Point::default(), Point::default()]).unwrap();
        assert!(space.is_empty());
    }
}
