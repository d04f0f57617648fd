// # Memory State Store
//
// Nothing survives a restart: a second run against the same manifest will
// try to create everything again. Useful for tests and one-shot runs that
// end with `destroy`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{StateRecord, StateStore};

/// Map of address to record, ordered by address
///
/// Clones share the same map, so a test can keep a handle while the
/// reconciler owns another.
///
/// ```rust,no_run
/// use mailgun_core::state::MemoryStateStore;
/// use mailgun_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///     let observer = store.clone();
///
///     store.delete("mailgun_domain.main").await?;
///     assert!(observer.list().await?.is_empty());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    records: Arc<RwLock<BTreeMap<String, StateRecord>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, address: &str) -> Result<Option<StateRecord>, Error> {
        Ok(self.records.read().await.get(address).cloned())
    }

    async fn put(&self, address: &str, record: &StateRecord) -> Result<(), Error> {
        self.records
            .write()
            .await
            .insert(address.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, address: &str) -> Result<(), Error> {
        self.records.write().await.remove(address);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    // Nothing is buffered
    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
