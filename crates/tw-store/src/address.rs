//! Store addressing and connectors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use duckdb::Connection;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tw_types::{config_error, StoreError, TwResult};

use crate::duck::DuckDbStore;
use crate::memory::MemoryStore;
use crate::store::DocumentStore;

/// Collection used when no `opt_label` is given.
pub const DEFAULT_COLLECTION: &str = "opt_default";

/// A fully resolved store location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreAddress {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub collection: String,
}

impl StoreAddress {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Same database, different collection.
    pub fn with_collection(&self, collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for StoreAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}",
            self.host, self.port, self.database, self.collection
        )
    }
}

/// Connection parameters carried by a launch pad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPad {
    pub host: String,
    pub port: u16,
    pub name: String,
}

/// Unresolved addressing options as they appear in a loop configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Database name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Collection holding this optimization's trials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lpad: Option<LaunchPad>,
}

impl StoreConfig {
    pub fn with_address(host: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_lpad(lpad: LaunchPad) -> Self {
        Self {
            lpad: Some(lpad),
            ..Self::default()
        }
    }

    pub fn with_opt_label(mut self, label: impl Into<String>) -> Self {
        self.opt_label = Some(label.into());
        self
    }

    pub fn collection(&self) -> &str {
        self.opt_label.as_deref().unwrap_or(DEFAULT_COLLECTION)
    }

    /// Pick the addressing scheme: explicit host/port/name first, then the
    /// launch pad. Partial explicit addressing is an error, not a fallback.
    pub fn resolve(&self) -> TwResult<StoreAddress> {
        let collection = self.collection().to_string();

        if self.host.is_some() || self.port.is_some() || self.name.is_some() {
            return match (&self.host, self.port, &self.name) {
                (Some(host), Some(port), Some(name)) => {
                    Ok(StoreAddress::new(host.clone(), port, name.clone(), collection))
                }
                _ => Err(config_error!("Host, port, and name must all be specified!")),
            };
        }

        if let Some(lpad) = &self.lpad {
            return Ok(StoreAddress::new(
                lpad.host.clone(),
                lpad.port,
                lpad.name.clone(),
                collection,
            ));
        }

        Err(config_error!(
            "The optimization database must be specified explicitly (with host, port, and name) or with a launch pad (lpad)"
        ))
    }
}

/// Opens document stores for resolved addresses.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, address: &StoreAddress) -> TwResult<Arc<dyn DocumentStore>>;
}

/// Connector handing out in-memory stores; the same address always yields
/// the same store, like collections on a shared server.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    stores: DashMap<StoreAddress, Arc<MemoryStore>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreConnector for MemoryConnector {
    fn connect(&self, address: &StoreAddress) -> TwResult<Arc<dyn DocumentStore>> {
        let store = self
            .stores
            .entry(address.clone())
            .or_insert_with(|| Arc::new(MemoryStore::new(address.collection.clone())))
            .clone();
        Ok(store)
    }
}

/// Connector mapping addresses to DuckDB files under a root directory:
/// `{root}/{host}_{port}/{database}.duckdb`, one table per collection.
#[derive(Debug)]
pub struct DuckDbConnector {
    root: PathBuf,
    databases: DashMap<PathBuf, Mutex<Connection>>,
    stores: DashMap<StoreAddress, Arc<DuckDbStore>>,
}

impl DuckDbConnector {
    pub fn new<P: AsRef<Path>>(root: P) -> TwResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::Connection {
            message: format!("cannot create store root {}: {e}", root.display()),
        })?;

        Ok(Self {
            root,
            databases: DashMap::new(),
            stores: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Database file backing `address`.
    pub fn database_path(&self, address: &StoreAddress) -> PathBuf {
        self.root
            .join(format!("{}_{}", sanitize(&address.host), address.port))
            .join(format!("{}.duckdb", sanitize(&address.database)))
    }

    /// DuckDB allows one database instance per file per process, so every
    /// collection of a file shares a cloned handle of the first connection.
    fn shared_connection(&self, path: &Path) -> TwResult<Connection> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Connection {
                message: format!("cannot create {}: {e}", parent.display()),
            })?;
        }

        let entry = match self.databases.entry(path.to_path_buf()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.into_ref(),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let conn = Connection::open(path).map_err(|e| StoreError::Connection {
                    message: e.to_string(),
                })?;
                entry.insert(Mutex::new(conn))
            }
        };

        let cloned = entry.value().lock().try_clone().map_err(|e| StoreError::Connection {
            message: e.to_string(),
        })?;
        Ok(cloned)
    }
}

impl StoreConnector for DuckDbConnector {
    fn connect(&self, address: &StoreAddress) -> TwResult<Arc<dyn DocumentStore>> {
        if let Some(store) = self.stores.get(address) {
            return Ok(store.value().clone());
        }

        let path = self.database_path(address);
        let connection = self.shared_connection(&path)?;
        let store = Arc::new(DuckDbStore::from_connection(connection, &address.collection)?);

        tracing::info!("Connected to {} at {}", address, path.display());

        let store = self
            .stores
            .entry(address.clone())
            .or_insert(store)
            .clone();
        Ok(store)
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
