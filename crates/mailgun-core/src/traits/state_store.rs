// # State Store Trait
//
// Defines the interface for persistent observed state.
//
// ## Purpose
//
// The state store remembers, per resource address (`mailgun_domain.main`):
// - The identity key of the remote entity
// - The last observed attributes, including write-only secrets that Mailgun
//   never returns (SMTP passwords)
// - When the entry was last written
//
// Without it, routes (whose ids are assigned remotely) could not be found
// again and password changes could not be detected.
//
// ## Implementations
//
// - In-memory: `MemoryStateStore`
// - JSON file: `FileStateStore`

use async_trait::async_trait;

use crate::model::{ResourceKind, ResourceState};

/// State record for one managed entity
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StateRecord {
    /// Identity key of the remote entity
    pub id: String,
    /// Last observed attributes
    pub state: ResourceState,
    /// Timestamp of the last write
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl StateRecord {
    /// Record the given observation, stamped now
    pub fn new(state: ResourceState) -> Self {
        Self {
            id: state.identity(),
            state,
            last_updated: chrono::Utc::now(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.state.kind()
    }
}

/// Trait for state store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage (files, databases, etc.)
/// - ✅ Cache state in memory (with explicit flush)
///
/// ## Forbidden Capabilities
/// - ❌ Call the Mailgun API (owned by the reconcilers)
/// - ❌ Decide what to create, update or delete (owned by `Reconciler`)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the record stored under `address`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(StateRecord))`: The stored record
    /// - `Ok(None)`: Nothing stored under this address
    /// - `Err(Error)`: Storage error
    async fn get(&self, address: &str) -> Result<Option<StateRecord>, crate::Error>;

    /// Create or replace the record stored under `address`
    async fn put(&self, address: &str, record: &StateRecord) -> Result<(), crate::Error>;

    /// Remove the record (no-op if absent)
    async fn delete(&self, address: &str) -> Result<(), crate::Error>;

    /// All stored addresses
    async fn list(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
