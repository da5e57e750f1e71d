//! Store seams: collection handle, connection, connection provider, and the
//! lease that ties a component to its connection.

use crate::config::ConnectionConfig;
use crate::document::CanonicalDocument;
use crate::errors::OpError;
use bson::{Bson, Document as BsonDocument};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Result cursor. Items are pulled lazily; consumers decide how much to drain.
pub type Cursor<'a> = Box<dyn Iterator<Item = Result<BsonDocument, OpError>> + Send + 'a>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: bool,
}

/// Raw store result of an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

pub trait StoreCollection: Send + Sync {
    /// # Errors
    /// Returns `OpError::Store` if the store rejects the filter or fails.
    fn find(&self, filter: Option<&CanonicalDocument>) -> Result<Cursor<'_>, OpError>;

    /// Update at most one matching document. Which one is store-defined.
    ///
    /// # Errors
    /// Returns `OpError::Store` if the store rejects either document or fails.
    fn update_one(
        &self,
        filter: &CanonicalDocument,
        update: &CanonicalDocument,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome, OpError>;

    /// # Errors
    /// Returns `OpError::Store` if the store rejects either document or fails.
    fn update_many(
        &self,
        filter: &CanonicalDocument,
        update: &CanonicalDocument,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome, OpError>;
}

pub trait StoreConnection: Send + Sync {
    /// # Errors
    /// Returns `OpError::Store` if the connection is closed.
    fn collection(&self, database: &str, name: &str) -> Result<Arc<dyn StoreCollection>, OpError>;
}

/// Identity of a component holding a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait ConnectionProvider: Send + Sync {
    /// # Errors
    /// Returns an error if a connection cannot be established.
    fn acquire(
        &self,
        owner: OwnerId,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn StoreConnection>, OpError>;

    fn release(&self, owner: OwnerId, config: &ConnectionConfig);
}

/// A connection held by one component. Released exactly once, on drop.
pub struct ConnectionLease {
    owner: OwnerId,
    config: ConnectionConfig,
    provider: Arc<dyn ConnectionProvider>,
    connection: Arc<dyn StoreConnection>,
}

impl ConnectionLease {
    /// # Errors
    /// Propagates the provider's acquisition error.
    pub fn acquire(
        provider: Arc<dyn ConnectionProvider>,
        config: ConnectionConfig,
    ) -> Result<Self, OpError> {
        let owner = OwnerId::new();
        let connection = provider.acquire(owner, &config)?;
        log::debug!("connection '{}' acquired by {owner}", config.id);
        Ok(Self { owner, config, provider, connection })
    }

    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// # Errors
    /// Propagates the connection's error.
    pub fn collection(&self, name: &str) -> Result<Arc<dyn StoreCollection>, OpError> {
        self.connection.collection(&self.config.database, name)
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.provider.release(self.owner, &self.config);
        log::debug!("connection '{}' released by {}", self.config.id, self.owner);
    }
}

impl fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("owner", &self.owner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
