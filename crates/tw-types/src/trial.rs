//! Persisted evaluation records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::TwResult;
use crate::space::Point;

/// Identifier of a persisted trial document.
pub type TrialId = Uuid;

/// Field names of the persisted record schema.
pub mod fields {
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const Z: &str = "z";
    pub const X_NEW: &str = "x_new";
    pub const Z_NEW: &str = "z_new";

    /// Fields a record must carry before aggregate reads may use it.
    pub const REQUIRED: [&str; 3] = [X, Y, Z];
}

/// One evaluated point, its score, auxiliary features, and (once the loop has
/// computed it) the candidate proposed from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Store identifier; not part of the document body.
    #[serde(skip)]
    pub id: Option<TrialId>,
    pub x: Point,
    pub y: f64,
    #[serde(default)]
    pub z: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_new: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_new: Option<Point>,
    /// Fields written by other collaborators alongside the schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trial {
    pub fn new(x: Point, y: f64, z: Point) -> Self {
        Self {
            id: None,
            x,
            y,
            z,
            x_new: None,
            z_new: None,
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// `x ++ z`, the row the predictor sees.
    pub fn features(&self) -> Point {
        self.x.concat(&self.z)
    }

    /// True once the candidate fields have been written.
    pub fn is_resolved(&self) -> bool {
        self.x_new.is_some()
    }

    /// Serialize to a document body.
    pub fn to_document(&self) -> TwResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Ok(Map::from_iter([("value".to_string(), other)])),
        }
    }

    /// Decode a document body. Returns `Ok(None)` when the document is still
    /// missing one of the required fields.
    pub fn from_document(id: TrialId, doc: &Map<String, Value>) -> TwResult<Option<Self>> {
        if !is_complete(doc) {
            return Ok(None);
        }
        let mut trial: Trial = serde_json::from_value(Value::Object(doc.clone()))?;
        trial.id = Some(id);
        Ok(Some(trial))
    }
}

/// The partial update written by the loop once a candidate is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateUpdate {
    pub x_new: Point,
    pub z_new: Point,
}

impl CandidateUpdate {
    pub fn to_fields(&self) -> TwResult<Map<String, Value>> {
        let mut update = Map::new();
        update.insert(fields::X_NEW.to_string(), serde_json::to_value(&self.x_new)?);
        update.insert(fields::Z_NEW.to_string(), serde_json::to_value(&self.z_new)?);
        Ok(update)
    }
}

/// Concurrency read protection: a document inserted by another iteration may
/// be observed before all of its fields exist.
pub fn is_complete(doc: &Map<String, Value>) -> bool {
    fields::REQUIRED.iter().all(|k| doc.contains_key(*k))
}
