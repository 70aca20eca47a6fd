//! Search space definitions: scalars, points, dimensions and spaces.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use crate::errors::{TwError, TwResult};
use crate::{config_error, input_error};

/// A single value of a point: integer, float, or categorical label.
///
/// Serialized untagged, so a point reads as a plain JSON array such as
/// `[3, 12.5, "red"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Label(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Label(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Label(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Label(_))
    }

    /// Numeric hash key shared by ints and floats so that `Int(2)` and
    /// `Float(2.0)` land in the same bucket.
    fn numeric_bits(v: f64) -> u64 {
        if v == 0.0 {
            0.0f64.to_bits()
        } else {
            v.to_bits()
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Label(a), Self::Label(b)) => a == b,
            (Self::Label(_), _) | (_, Self::Label(_)) => false,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

// NaN never appears in a validated space, so equality is reflexive for every
// value the loop compares.
impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Int(v) => {
                0u8.hash(state);
                Self::numeric_bits(*v as f64).hash(state);
            }
            Self::Float(v) => {
                0u8.hash(state);
                Self::numeric_bits(*v).hash(state);
            }
            Self::Label(v) => {
                1u8.hash(state);
                v.hash(state);
            }
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Label(a), Self::Label(b)) => Some(a.cmp(b)),
            (Self::Label(_), _) | (_, Self::Label(_)) => None,
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Label(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Label(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Label(v)
    }
}

/// An ordered vector of scalars aligned positionally with a [`Space`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Point(Vec<Scalar>);

impl Point {
    pub fn new(values: Vec<Scalar>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Scalar> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scalar> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Scalar] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Scalar> {
        self.0
    }

    /// Concatenate two points (`x ++ z`).
    pub fn concat(&self, other: &Point) -> Point {
        let mut values = Vec::with_capacity(self.len() + other.len());
        values.extend_from_slice(&self.0);
        values.extend_from_slice(&other.0);
        Point(values)
    }

    /// Split into the first `at` values and the remainder. `at` past the end
    /// yields an empty tail.
    pub fn split_at(mut self, at: usize) -> (Point, Point) {
        let tail = if at < self.0.len() {
            self.0.split_off(at)
        } else {
            Vec::new()
        };
        (self, Point(tail))
    }
}

impl std::ops::Index<usize> for Point {
    type Output = Scalar;

    fn index(&self, index: usize) -> &Scalar {
        &self.0[index]
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for Point {
    fn from(values: Vec<T>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Scalar>, const N: usize> From<[T; N]> for Point {
    fn from(values: [T; N]) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<Scalar> for Point {
    fn from_iter<I: IntoIterator<Item = Scalar>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Point {
    type Item = &'a Scalar;
    type IntoIter = std::slice::Iter<'a, Scalar>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (idx, value) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

/// Classification of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionKind {
    ContinuousInt,
    ContinuousFloat,
    Categorical,
}

/// One axis of a search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DimensionRepr", into = "TaggedDimension")]
pub enum Dimension {
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Continuous range [low, high]; never finite.
    FloatRange { low: f64, high: f64 },
    /// Ordered set of distinct choices.
    Categorical { values: Vec<Scalar> },
}

impl Dimension {
    pub fn int(low: i64, high: i64) -> TwResult<Self> {
        if low > high {
            return Err(config_error!(
                "Dimension lower bound {low} exceeds upper bound {high}"
            ));
        }
        Ok(Self::IntRange { low, high })
    }

    pub fn float(low: f64, high: f64) -> TwResult<Self> {
        if !low.is_finite() || !high.is_finite() {
            return Err(config_error!(
                "Dimension bounds must be finite, got ({low}, {high})"
            ));
        }
        if low > high {
            return Err(config_error!(
                "Dimension lower bound {low} exceeds upper bound {high}"
            ));
        }
        Ok(Self::FloatRange { low, high })
    }

    pub fn categorical<T: Into<Scalar>>(values: Vec<T>) -> TwResult<Self> {
        let values: Vec<Scalar> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(config_error!("Categorical dimension has no values"));
        }
        let mut seen = HashSet::with_capacity(values.len());
        for value in &values {
            if let Scalar::Float(v) = value {
                if v.is_nan() {
                    return Err(config_error!("Categorical dimension contains NaN"));
                }
            }
            if !seen.insert(value) {
                return Err(config_error!(
                    "Categorical dimension contains duplicate value {value}"
                ));
            }
        }
        Ok(Self::Categorical { values })
    }

    /// Parse the compact tuple notation: `[low, high]` for numeric ranges,
    /// any other list for a categorical set.
    pub fn from_compact(values: Vec<Scalar>) -> TwResult<Self> {
        match values.as_slice() {
            [Scalar::Int(low), Scalar::Int(high)] => Self::int(*low, *high),
            [low, high] if low.is_numeric() && high.is_numeric() => Self::float(
                low.as_f64().unwrap_or_default(),
                high.as_f64().unwrap_or_default(),
            ),
            _ => Self::categorical(values),
        }
    }

    pub fn classify(&self) -> DimensionKind {
        match self {
            Self::IntRange { .. } => DimensionKind::ContinuousInt,
            Self::FloatRange { .. } => DimensionKind::ContinuousFloat,
            Self::Categorical { .. } => DimensionKind::Categorical,
        }
    }

    pub fn is_discrete(&self) -> bool {
        !matches!(self, Self::FloatRange { .. })
    }

    /// Number of distinct values, `None` for float ranges (or ranges too wide
    /// to count in a `usize`).
    pub fn cardinality(&self) -> Option<usize> {
        match self {
            Self::IntRange { low, high } => usize::try_from(*high as i128 - *low as i128 + 1).ok(),
            Self::FloatRange { .. } => None,
            Self::Categorical { values } => Some(values.len()),
        }
    }

    /// Every value of a discrete dimension in declared order.
    pub fn values(&self) -> Option<Vec<Scalar>> {
        match self {
            Self::IntRange { low, high } => Some((*low..=*high).map(Scalar::Int).collect()),
            Self::FloatRange { .. } => None,
            Self::Categorical { values } => Some(values.clone()),
        }
    }

    pub fn contains(&self, value: &Scalar) -> bool {
        match (self, value) {
            (Self::IntRange { low, high }, Scalar::Int(v)) => low <= v && v <= high,
            (Self::IntRange { .. }, _) => false,
            (Self::FloatRange { low, high }, v) => match v.as_f64() {
                Some(v) => *low <= v && v <= *high,
                None => false,
            },
            (Self::Categorical { values }, v) => values.contains(v),
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IntRange { low, high } => write!(f, "({low}, {high})"),
            Self::FloatRange { low, high } => write!(f, "({low:?}, {high:?})"),
            Self::Categorical { values } => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TaggedDimension {
    IntRange { low: i64, high: i64 },
    FloatRange { low: f64, high: f64 },
    Categorical { values: Vec<Scalar> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DimensionRepr {
    Tagged(TaggedDimension),
    Compact(Vec<Scalar>),
}

impl TryFrom<DimensionRepr> for Dimension {
    type Error = TwError;

    fn try_from(repr: DimensionRepr) -> TwResult<Self> {
        match repr {
            DimensionRepr::Tagged(TaggedDimension::IntRange { low, high }) => Self::int(low, high),
            DimensionRepr::Tagged(TaggedDimension::FloatRange { low, high }) => {
                Self::float(low, high)
            }
            DimensionRepr::Tagged(TaggedDimension::Categorical { values }) => {
                Self::categorical(values)
            }
            DimensionRepr::Compact(values) => Self::from_compact(values),
        }
    }
}

impl From<Dimension> for TaggedDimension {
    fn from(dim: Dimension) -> Self {
        match dim {
            Dimension::IntRange { low, high } => Self::IntRange { low, high },
            Dimension::FloatRange { low, high } => Self::FloatRange { low, high },
            Dimension::Categorical { values } => Self::Categorical { values },
        }
    }
}

/// An ordered list of dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Space {
    dimensions: Vec<Dimension>,
}

impl Space {
    pub fn new(dimensions: Vec<Dimension>) -> Self {
        Self { dimensions }
    }

    /// Build a space from compact tuple notation, validating each dimension.
    pub fn from_compact(dimensions: Vec<Vec<Scalar>>) -> TwResult<Self> {
        let dimensions = dimensions
            .into_iter()
            .map(Dimension::from_compact)
            .collect::<TwResult<Vec<_>>>()?;
        Ok(Self { dimensions })
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dimension> {
        self.dimensions.iter()
    }

    /// True iff every dimension is categorical or an integer range.
    pub fn is_totally_discrete(&self) -> bool {
        self.dimensions.iter().all(Dimension::is_discrete)
    }

    /// Declared dimensions followed by `other`'s.
    pub fn concat(&self, other: &Space) -> Space {
        let mut dimensions = self.dimensions.clone();
        dimensions.extend(other.dimensions.iter().cloned());
        Space { dimensions }
    }

    /// Check that `point` has one in-range value per dimension.
    pub fn check_point(&self, point: &Point) -> TwResult<()> {
        if point.len() != self.len() {
            return Err(input_error!(
                "Point {point} has {} values but the space has {} dimensions",
                point.len(),
                self.len()
            ));
        }
        for (idx, (dim, value)) in self.dimensions.iter().zip(point.iter()).enumerate() {
            if !dim.contains(value) {
                return Err(input_error!(
                    "Value {value} at position {idx} is outside dimension {dim}"
                ));
            }
        }
        Ok(())
    }
}

impl FromIterator<Dimension> for Space {
    fn from_iter<I: IntoIterator<Item = Dimension>>(iter: I) -> Self {
        Self {
            dimensions: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Space {
    type Item = &'a Dimension;
    type IntoIter = std::slice::Iter<'a, Dimension>;

    fn into_iter(self) -> Self::IntoIter {
        self.dimensions.iter()
    }
}
