//! Registration storage.
//!
//! The [`RegistrationStore`] trait is plain keyed storage: it does not check
//! quotas, transitions or budgets. Those invariants live in the
//! [`Registry`](crate::registry::Registry), which serializes every
//! read-modify-write before it reaches the store. Swapping in a persistent
//! backend therefore only means implementing this trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use overseer_runtime::store::{InMemoryRegistrationStore, RegistrationStore};
//!
//! let store = InMemoryRegistrationStore::shared();
//! store.insert(registration.clone()).await?;
//! let owned = store.list_by_owner(&registration.owner).await?;
//! ```

use async_trait::async_trait;
use overseer_core::{AgentRegistration, OwnerId, RegistrationId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A registration with this id already exists.
    #[error("Registration already exists: {0}")]
    Conflict(RegistrationId),

    /// `replace` was called for an id that is not stored.
    #[error("Registration missing from store: {0}")]
    Missing(RegistrationId),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Async keyed storage for registrations.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert a new registration. Fails with [`StoreError::Conflict`] if the
    /// id is taken.
    async fn insert(&self, registration: AgentRegistration) -> StoreResult<()>;

    async fn get(&self, id: &RegistrationId) -> StoreResult<Option<AgentRegistration>>;

    /// Overwrite an existing registration. Fails with
    /// [`StoreError::Missing`] if it is not stored.
    async fn replace(&self, registration: AgentRegistration) -> StoreResult<()>;

    async fn remove(&self, id: &RegistrationId) -> StoreResult<Option<AgentRegistration>>;

    /// Every registration, in insertion order.
    async fn list(&self) -> StoreResult<Vec<AgentRegistration>>;

    /// Registrations belonging to `owner`, in insertion order.
    async fn list_by_owner(&self, owner: &OwnerId) -> StoreResult<Vec<AgentRegistration>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| &r.owner == owner)
            .collect())
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.list().await?.len())
    }

    async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }
}

#[derive(Debug)]
struct Stored {
    seq: u64,
    registration: AgentRegistration,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    by_id: HashMap<RegistrationId, Stored>,
    by_owner: HashMap<OwnerId, HashSet<RegistrationId>>,
}

impl Inner {
    fn sorted(&self, ids: impl Iterator<Item = RegistrationId>) -> Vec<AgentRegistration> {
        let mut entries: Vec<&Stored> = ids.filter_map(|id| self.by_id.get(&id)).collect();
        entries.sort_by_key(|s| s.seq);
        entries.into_iter().map(|s| s.registration.clone()).collect()
    }
}

/// In-memory store with an owner index.
#[derive(Debug, Default)]
pub struct InMemoryRegistrationStore {
    inner: RwLock<Inner>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn insert(&self, registration: AgentRegistration) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.by_id.contains_key(&registration.id) {
            return Err(StoreError::Conflict(registration.id));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .by_owner
            .entry(registration.owner.clone())
            .or_default()
            .insert(registration.id.clone());
        inner
            .by_id
            .insert(registration.id.clone(), Stored { seq, registration });
        Ok(())
    }

    async fn get(&self, id: &RegistrationId) -> StoreResult<Option<AgentRegistration>> {
        let inner = self.inner.read().await;
        Ok(inner.by_id.get(id).map(|s| s.registration.clone()))
    }

    async fn replace(&self, registration: AgentRegistration) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.by_id.get_mut(&registration.id) else {
            return Err(StoreError::Missing(registration.id));
        };
        let previous_owner = std::mem::replace(&mut stored.registration, registration.clone()).owner;
        if previous_owner != registration.owner {
            if let Some(ids) = inner.by_owner.get_mut(&previous_owner) {
                ids.remove(&registration.id);
            }
            inner
                .by_owner
                .entry(registration.owner.clone())
                .or_default()
                .insert(registration.id.clone());
        }
        Ok(())
    }

    async fn remove(&self, id: &RegistrationId) -> StoreResult<Option<AgentRegistration>> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.by_id.remove(id) else {
            return Ok(None);
        };
        let owner = &stored.registration.owner;
        if let Some(ids) = inner.by_owner.get_mut(owner) {
            ids.remove(id);
            if ids.is_empty() {
                inner.by_owner.remove(owner);
            }
        }
        Ok(Some(stored.registration))
    }

    async fn list(&self) -> StoreResult<Vec<AgentRegistration>> {
        let inner = self.inner.read().await;
        Ok(inner.sorted(inner.by_id.keys().cloned()))
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> StoreResult<Vec<AgentRegistration>> {
        let inner = self.inner.read().await;
        let Some(ids) = inner.by_owner.get(owner) else {
            return Ok(Vec::new());
        };
        Ok(inner.sorted(ids.iter().cloned()))
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.inner.read().await.by_id.len())
    }
}
