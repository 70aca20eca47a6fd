//! In-memory document store.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tw_types::{StoreError, TrialId, TwResult};
use uuid::Uuid;

use crate::store::{Document, DocumentStore};

/// Document store held entirely in memory.
///
/// Documents live in a sharded map so merges into one document never block
/// readers of another; insertion order is tracked separately.
#[derive(Debug)]
pub struct MemoryStore {
    collection: String,
    documents: DashMap<TrialId, Map<String, Value>>,
    order: RwLock<Vec<TrialId>>,
}

impl MemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            documents: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&self, body: Map<String, Value>) -> TwResult<TrialId> {
        let id = Uuid::new_v4();
        // Body first so any id visible in `order` resolves to a document.
        self.documents.insert(id, body);
        self.order.write().push(id);
        Ok(id)
    }

    fn merge(&self, id: &TrialId, fields: Map<String, Value>) -> TwResult<()> {
        match self.documents.get_mut(id) {
            Some(mut doc) => {
                for (key, value) in fields {
                    doc.insert(key, value);
                }
                Ok(())
            }
            None => Err(StoreError::DocumentNotFound { id: id.to_string() }.into()),
        }
    }

    fn find_all(&self) -> TwResult<Vec<Document>> {
        let ids = self.order.read().clone();
        Ok(ids
            .into_iter()
            .filter_map(|id| {
                self.documents.get(&id).map(|body| Document {
                    id,
                    body: body.value().clone(),
                })
            })
            .collect())
    }

    fn count(&self) -> TwResult<usize> {
        Ok(self.documents.len())
    }

    fn delete_all(&self) -> TwResult<usize> {
        let mut order = self.order.write();
        let removed = self.documents.len();
        self.documents.clear();
        order.clear();
        Ok(removed)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_merge_find() {
        let store = MemoryStore::new("opt_default");
        let first = store.insert(body(json!({"x": [1], "y": 1.0, "z": []}))).unwrap();
        let second = store.insert(body(json!({"x": [2], "y": 2.0, "z": []}))).unwrap();

        store.merge(&first, body(json!({"x_new": [3]}))).unwrap();

        let docs = store.find_all().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, first);
        assert_eq!(docs[1].id, second);
        assert_eq!(docs[0].body.get("x_new"), Some(&json!([3])));
        // merge keeps existing fields
        assert_eq!(docs[0].body.get("y"), Some(&json!(1.0)));
    }

    #[test]
    fn merge_unknown_document_fails() {
        let store = MemoryStore::new("opt_default");
        let result = store.merge(&Uuid::new_v4(), Map::new());
        assert!(matches!(
            result,
            Err(tw_types::TwError::Store(StoreError::DocumentNotFound { .. }))
        ));
    }

    #[test]
    fn delete_all_reports_count() {
        let store = MemoryStore::new("opt_default");
        store.insert(Map::new()).unwrap();
        store.insert(Map::new()).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.delete_all().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.find_all().unwrap().is_empty());
    }
}
