//! In-process document store implementing the store seams.
//!
//! A [`MemoryServer`] owns the data. A [`MemoryProvider`] hands out one
//! [`MemoryClient`] per connection configuration id and reference-counts the
//! owners holding it; the client is closed when its last owner releases it.

mod collection;
mod filter;
pub mod seed;
mod update;

pub use collection::{DocumentId, MemoryCollection, MemoryCursor, Metadata, StoredDocument};
pub use filter::{CmpOp, Filter, compare_bson, compile as compile_filter, eval_filter};
pub use update::UpdateDoc;

use crate::config::ConnectionConfig;
use crate::errors::OpError;
use crate::store::{ConnectionProvider, OwnerId, StoreCollection, StoreConnection};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type CollectionMap = HashMap<String, Arc<MemoryCollection>>;

#[derive(Default)]
pub struct MemoryServer {
    databases: RwLock<HashMap<String, CollectionMap>>,
}

impl MemoryServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a collection, creating it (and its database) on first use.
    pub fn collection(&self, database: &str, name: &str) -> Arc<MemoryCollection> {
        if let Some(c) = self.databases.read().get(database).and_then(|db| db.get(name)) {
            return c.clone();
        }
        let mut dbs = self.databases.write();
        dbs.entry(database.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| {
                log::info!("created collection {database}.{name}");
                Arc::new(MemoryCollection::new(name.to_string()))
            })
            .clone()
    }

    #[must_use]
    pub fn list_collection_names(&self, database: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .databases
            .read()
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// A client bound to one server. Unusable once closed.
pub struct MemoryClient {
    server: Arc<MemoryServer>,
    closed: AtomicBool,
}

impl MemoryClient {
    #[must_use]
    pub fn new(server: Arc<MemoryServer>) -> Self {
        Self { server, closed: AtomicBool::new(false) }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl StoreConnection for MemoryClient {
    fn collection(&self, database: &str, name: &str) -> Result<Arc<dyn StoreCollection>, OpError> {
        if self.is_closed() {
            return Err(OpError::Store("client is closed".into()));
        }
        Ok(self.server.collection(database, name))
    }
}

struct ClientEntry {
    client: Arc<MemoryClient>,
    owners: HashSet<OwnerId>,
}

/// Shares one client among every owner of the same connection configuration.
pub struct MemoryProvider {
    server: Arc<MemoryServer>,
    clients: Mutex<HashMap<String, ClientEntry>>,
}

impl MemoryProvider {
    #[must_use]
    pub fn new(server: Arc<MemoryServer>) -> Self {
        Self { server, clients: Mutex::new(HashMap::new()) }
    }

    #[must_use]
    pub fn server(&self) -> &Arc<MemoryServer> {
        &self.server
    }

    /// Number of clients currently open.
    #[must_use]
    pub fn open_clients(&self) -> usize {
        self.clients.lock().len()
    }

    /// Number of owners holding the client for `config_id`.
    #[must_use]
    pub fn owners(&self, config_id: &str) -> usize {
        self.clients.lock().get(config_id).map_or(0, |e| e.owners.len())
    }

    /// Close every open client, regardless of owners.
    pub fn dispose_all(&self) {
        for (id, entry) in self.clients.lock().drain() {
            entry.client.close();
            log::info!("client '{id}' closed on dispose ({} owners left)", entry.owners.len());
        }
    }
}

impl ConnectionProvider for MemoryProvider {
    fn acquire(
        &self,
        owner: OwnerId,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn StoreConnection>, OpError> {
        if config.database.trim().is_empty() {
            return Err(OpError::Config("database name must not be empty".into()));
        }
        let mut clients = self.clients.lock();
        let entry = clients.entry(config.id.clone()).or_insert_with(|| {
            log::info!("opening client '{}'", config.id);
            ClientEntry {
                client: Arc::new(MemoryClient::new(self.server.clone())),
                owners: HashSet::new(),
            }
        });
        entry.owners.insert(owner);
        Ok(entry.client.clone())
    }

    fn release(&self, owner: OwnerId, config: &ConnectionConfig) {
        let mut clients = self.clients.lock();
        let Some(entry) = clients.get_mut(&config.id) else {
            log::warn!("release of unknown client '{}' by {owner}", config.id);
            return;
        };
        if !entry.owners.remove(&owner) {
            log::warn!("{owner} released client '{}' it did not hold", config.id);
        }
        if entry.owners.is_empty()
            && let Some(entry) = clients.remove(&config.id)
        {
            entry.client.close();
            log::info!("client '{}' closed", config.id);
        }
    }
}
