//! DuckDB-backed document store.

use std::path::Path;

use duckdb::{params, Connection};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tw_types::{config_error, StoreError, TrialId, TwError, TwResult};
use uuid::Uuid;

use crate::store::{Document, DocumentStore};

/// Document store persisting each collection as a DuckDB table of JSON bodies.
#[derive(Debug)]
pub struct DuckDbStore {
    collection: String,
    connection: Mutex<Connection>,
}

impl DuckDbStore {
    /// Open (or create) the database file at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P, collection: &str) -> TwResult<Self> {
        let connection = Connection::open(db_path).map_err(connection_failed)?;
        Self::from_connection(connection, collection)
    }

    pub fn open_in_memory(collection: &str) -> TwResult<Self> {
        let connection = Connection::open_in_memory().map_err(connection_failed)?;
        Self::from_connection(connection, collection)
    }

    /// Use an existing connection; the collection table is created if missing.
    pub fn from_connection(connection: Connection, collection: &str) -> TwResult<Self> {
        validate_table_name(collection)?;

        let ddl = format!(
            "CREATE SEQUENCE IF NOT EXISTS {collection}_seq;

            CREATE TABLE IF NOT EXISTS {collection} (
                id TEXT PRIMARY KEY,
                seq BIGINT NOT NULL,
                doc TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );"
        );
        connection
            .execute_batch(&ddl)
            .map_err(|e| query_failed(&ddl, e))?;

        tracing::debug!("Opened DuckDB collection {}", collection);

        Ok(Self {
            collection: collection.to_string(),
            connection: Mutex::new(connection),
        })
    }
}

impl DocumentStore for DuckDbStore {
    fn insert(&self, body: Map<String, Value>) -> TwResult<TrialId> {
        let id = Uuid::new_v4();
        let doc = serde_json::to_string(&body)?;
        let sql = format!(
            "INSERT INTO {t} (id, seq, doc) VALUES (?, nextval('{t}_seq'), ?)",
            t = self.collection
        );

        let conn = self.connection.lock();
        conn.execute(&sql, params![id.to_string(), doc])
            .map_err(|e| query_failed(&sql, e))?;
        Ok(id)
    }

    fn merge(&self, id: &TrialId, fields: Map<String, Value>) -> TwResult<()> {
        let select = format!("SELECT doc FROM {} WHERE id = ?", self.collection);
        let update = format!(
            "UPDATE {} SET doc = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            self.collection
        );

        // Read-modify-write under the connection lock keeps the merge atomic
        // for this document.
        let conn = self.connection.lock();
        let raw: String = match conn.query_row(&select, params![id.to_string()], |row| row.get(0)) {
            Ok(raw) => raw,
            Err(duckdb::Error::QueryReturnedNoRows) => {
                return Err(StoreError::DocumentNotFound { id: id.to_string() }.into())
            }
            Err(e) => return Err(query_failed(&select, e)),
        };

        let mut body = parse_body(&raw)?;
        for (key, value) in fields {
            body.insert(key, value);
        }
        let doc = serde_json::to_string(&body)?;

        conn.execute(&update, params![doc, id.to_string()])
            .map_err(|e| query_failed(&update, e))?;
        Ok(())
    }

    fn find_all(&self) -> TwResult<Vec<Document>> {
        let sql = format!("SELECT id, doc FROM {} ORDER BY seq", self.collection);

        let rows: Vec<(String, String)> = {
            let conn = self.connection.lock();
            let mut stmt = conn.prepare(&sql).map_err(|e| query_failed(&sql, e))?;
            let mapped = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(|e| query_failed(&sql, e))?;
            mapped
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| query_failed(&sql, e))?
        };

        rows.into_iter()
            .map(|(id, raw)| {
                let id = Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt {
                    message: format!("invalid document id {id}: {e}"),
                })?;
                Ok(Document {
                    id,
                    body: parse_body(&raw)?,
                })
            })
            .collect()
    }

    fn count(&self) -> TwResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.collection);
        let conn = self.connection.lock();
        let count: i64 = conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| query_failed(&sql, e))?;
        Ok(count.max(0) as usize)
    }

    fn delete_all(&self) -> TwResult<usize> {
        let sql = format!("DELETE FROM {}", self.collection);
        let conn = self.connection.lock();
        let removed = conn.execute(&sql, []).map_err(|e| query_failed(&sql, e))?;
        tracing::debug!("Deleted {} documents from {}", removed, self.collection);
        Ok(removed)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

/// Collection labels become table names, so they are restricted to plain
/// identifiers.
fn validate_table_name(name: &str) -> TwResult<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(config_error!(
            "Collection label {name:?} must start with a letter or underscore and contain only letters, digits, or underscores"
        ));
    }
    Ok(())
}

fn parse_body(raw: &str) -> TwResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Corrupt {
            message: format!("document body is not an object: {other}"),
        }
        .into()),
    }
}

fn connection_failed(e: duckdb::Error) -> TwError {
    StoreError::Connection {
        message: e.to_string(),
    }
    .into()
}

fn query_failed(query: &str, e: duckdb::Error) -> TwError {
    StoreError::QueryFailed {
        query: query.to_string(),
        error: e.to_string(),
    }
    .into()
}
