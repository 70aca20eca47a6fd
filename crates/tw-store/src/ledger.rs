//! The append-only evaluation ledger.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};
use tw_types::{
    fields, input_error, CandidateUpdate, Point, Scalar, Trial, TrialId, TwError, TwResult,
};

use crate::store::{Document, DocumentStore};

/// A key accepted by the aggregate queries.
///
/// Input-side keys name a whole vector field (`x`, `z`, `x_new`, `z_new`) or
/// one position of it (`x[0]`, `z.1`, `x_new[2]`); every other key is output
/// side (`y` or an extra field).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKey {
    Vector { field: &'static str },
    Input { field: &'static str, index: usize },
    Output(String),
}

impl FieldKey {
    pub fn parse(key: &str) -> Self {
        const VECTOR_FIELDS: [&str; 4] = [fields::X, fields::Z, fields::X_NEW, fields::Z_NEW];

        for field in VECTOR_FIELDS {
            if key == field {
                return Self::Vector { field };
            }
            if let Some(rest) = key.strip_prefix(field) {
                let index = rest
                    .strip_prefix('[')
                    .and_then(|r| r.strip_suffix(']'))
                    .or_else(|| rest.strip_prefix('.'))
                    .and_then(|i| i.parse::<usize>().ok());
                if let Some(index) = index {
                    return Self::Input { field, index };
                }
            }
        }
        Self::Output(key.to_string())
    }
}

/// Thin contract over a document store holding one optimization's trials.
///
/// Reads never block on writers: they work on snapshots and silently skip
/// documents another iteration is still writing.
#[derive(Debug, Clone)]
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn collection(&self) -> &str {
        self.store.collection()
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn append(&self, trial: &Trial) -> TwResult<TrialId> {
        let id = self.store.insert(trial.to_document()?)?;
        debug!("Appended trial {} to {}", id, self.collection());
        Ok(id)
    }

    /// Partial merge into an existing record.
    pub fn update(&self, id: &TrialId, fields: Map<String, Value>) -> TwResult<()> {
        self.store.merge(id, fields)?;
        debug!("Updated trial {} in {}", id, self.collection());
        Ok(())
    }

    pub fn record_candidate(&self, id: &TrialId, update: &CandidateUpdate) -> TwResult<()> {
        self.update(id, update.to_fields()?)
    }

    /// Every record carrying all of `x`, `y` and `z`, in insertion order.
    pub fn all_complete(&self) -> TwResult<Vec<Trial>> {
        let mut trials = Vec::new();
        for doc in self.store.find_all()? {
            if let Some(trial) = Trial::from_document(doc.id, &doc.body)? {
                trials.push(trial);
            }
        }
        Ok(trials)
    }

    /// The `x` of every record that has one, including records another
    /// iteration has not finished writing.
    pub fn evaluated_points(&self) -> TwResult<Vec<Point>> {
        self.store
            .find_all()?
            .into_iter()
            .filter_map(|doc| doc.body.get(fields::X).cloned())
            .map(|x| serde_json::from_value::<Point>(x).map_err(TwError::from))
            .collect()
    }

    pub fn count(&self) -> TwResult<usize> {
        self.store.count()
    }

    /// Raw documents matching every field of `filter` (an empty filter matches
    /// all documents).
    pub fn query(&self, filter: &Map<String, Value>) -> TwResult<Vec<Document>> {
        Ok(self
            .store
            .find_all()?
            .into_iter()
            .filter(|doc| doc.matches(filter))
            .collect())
    }

    /// The value of `key` in every complete record.
    pub fn values_of(&self, key: &str) -> TwResult<Vec<Scalar>> {
        let key_spec = FieldKey::parse(key);
        self.all_complete()?
            .iter()
            .map(|trial| self.lookup(trial, key, &key_spec))
            .collect()
    }

    /// The whole vector named by `key` (`x`, `z`, `x_new` or `z_new`) in
    /// every complete record.
    pub fn points_of(&self, key: &str) -> TwResult<Vec<Point>> {
        let FieldKey::Vector { field } = FieldKey::parse(key) else {
            return Err(input_error!(
                "{key} is not a vector field; use values_of for scalar keys"
            ));
        };
        self.all_complete()?
            .into_iter()
            .map(|trial| {
                vector_field(&trial, field)
                    .cloned()
                    .ok_or_else(|| TwError::key_not_found(key, self.collection()))
            })
            .collect()
    }

    /// Sum of a numeric key; stays an integer when every value is one.
    pub fn sum_of(&self, key: &str) -> TwResult<Scalar> {
        let values = self.values_of(key)?;
        numeric_sum(key, &values)
    }

    /// Mean of a numeric key. Integer keys average with truncation and stay
    /// integers.
    pub fn average_of(&self, key: &str) -> TwResult<Scalar> {
        let values = self.values_of(key)?;
        if values.is_empty() {
            return Err(input_error!(
                "Cannot average {key}: the {} collection has no complete records",
                self.collection()
            ));
        }
        let count = values.len();
        match numeric_sum(key, &values)? {
            Scalar::Int(total) => Ok(Scalar::Int(total / count as i64)),
            total => Ok(Scalar::Float(
                total.as_f64().unwrap_or_default() / count as f64,
            )),
        }
    }

    /// Minimum (or maximum) of `key` and the `x` of the record holding it.
    /// Ties keep the first record when minimizing and the last when
    /// maximizing.
    pub fn extremum_of(&self, key: &str, minimize: bool) -> TwResult<(Scalar, Point)> {
        let key_spec = FieldKey::parse(key);
        let mut best: Option<(Scalar, Point)> = None;

        for trial in self.all_complete()? {
            let value = self.lookup(&trial, key, &key_spec)?;
            let replace = match &best {
                None => true,
                Some((current, _)) => {
                    let ordering = value.partial_cmp(current).ok_or_else(|| {
                        input_error!("Values of {key} are not comparable: {value} and {current}")
                    })?;
                    if minimize {
                        ordering == Ordering::Less
                    } else {
                        ordering != Ordering::Less
                    }
                }
            };
            if replace {
                best = Some((value, trial.x));
            }
        }

        best.ok_or_else(|| TwError::key_not_found(key, self.collection()))
    }

    /// Copy every record into `target`, returning how many were copied.
    pub fn back_up(&self, target: &Ledger) -> TwResult<usize> {
        info!(
            "Backing up {} into {}",
            self.collection(),
            target.collection()
        );
        let mut copied = 0;
        for doc in self.store.find_all()? {
            target.store.insert(doc.body)?;
            copied += 1;
        }
        info!("Backed up {} documents", copied);
        Ok(copied)
    }

    /// Delete every record. Operator action only; the loop never calls this.
    pub fn purge(&self) -> TwResult<usize> {
        let removed = self.store.delete_all()?;
        info!("Removed {} documents from {}", removed, self.collection());
        Ok(removed)
    }

    fn lookup(&self, trial: &Trial, key: &str, key_spec: &FieldKey) -> TwResult<Scalar> {
        let found = match key_spec {
            FieldKey::Vector { .. } => {
                return Err(input_error!(
                    "{key} is a whole vector; address one position such as {key}[0], or read it with points_of"
                ))
            }
            FieldKey::Input { field, index } => {
                vector_field(trial, field).and_then(|v| v.get(*index)).cloned()
            }
            FieldKey::Output(name) if name == fields::Y => Some(Scalar::Float(trial.y)),
            FieldKey::Output(name) => match trial.extra.get(name) {
                Some(value) => Some(
                    serde_json::from_value::<Scalar>(value.clone())
                        .map_err(|_| input_error!("Field {name} holds a non-scalar value {value}"))?,
                ),
                None => None,
            },
        };

        found.ok_or_else(|| TwError::key_not_found(key, self.collection()))
    }
}

fn vector_field<'a>(trial: &'a Trial, field: &str) -> Option<&'a Point> {
    match field {
        fields::X => Some(&trial.x),
        fields::Z => Some(&trial.z),
        fields::X_NEW => trial.x_new.as_ref(),
        _ => trial.z_new.as_ref(),
    }
}

fn numeric_sum(key: &str, values: &[Scalar]) -> TwResult<Scalar> {
    if let Some(label) = values.iter().find(|v| !v.is_numeric()) {
        return Err(input_error!("Values of {key} are not numeric: found {label}"));
    }

    if values.iter().all(|v| matches!(v, Scalar::Int(_))) {
        let total = values
            .iter()
            .filter_map(Scalar::as_i64)
            .try_fold(0i64, |acc, v| acc.checked_add(v))
            .ok_or_else(|| input_error!("Sum of {key} overflows"))?;
        Ok(Scalar::Int(total))
    } else {
        Ok(Scalar::Float(values.iter().filter_map(Scalar::as_f64).sum()))
    }
}
