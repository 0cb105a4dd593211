//! In-memory pool storage

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;
use uuid::Uuid;

use super::Storage;
use crate::error::{Result, ZoneCtlError};
use crate::objects::{Pool, RequestContext};

/// Pool table kept in insertion order
#[derive(Default)]
pub struct MemoryStorage {
    pools: RwLock<Vec<Pool>>,
    injected_failures: AtomicU32,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `pools`
    pub fn with_pools(pools: impl IntoIterator<Item = Pool>) -> Self {
        let storage = Self::new();
        for pool in pools {
            storage.insert(pool);
        }
        storage
    }

    /// Insert or replace a pool by id
    pub fn insert(&self, pool: Pool) {
        let mut pools = self.pools.write();
        match pools.iter_mut().find(|p| p.id == pool.id) {
            Some(existing) => *existing = pool,
            None => pools.push(pool),
        }
    }

    pub fn remove(&self, pool_id: Uuid) -> Option<Pool> {
        let mut pools = self.pools.write();
        let index = pools.iter().position(|p| p.id == pool_id)?;
        Some(pools.remove(index))
    }

    /// Make the next `count` lookups fail with a storage error
    pub fn fail_next(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> Result<()> {
        let taken = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match taken {
            Ok(_) => Err(ZoneCtlError::Storage {
                message: "injected storage failure".into(),
            }),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn find_pools(&self, ctx: &RequestContext) -> Result<Vec<Pool>> {
        self.take_injected_failure()?;
        let pools = self.pools.read().clone();
        debug!(request = %ctx.request_id, pools = pools.len(), "listed pools");
        Ok(pools)
    }

    async fn get_pool(&self, _ctx: &RequestContext, pool_id: Uuid) -> Result<Pool> {
        self.take_injected_failure()?;
        self.pools
            .read()
            .iter()
            .find(|p| p.id == pool_id)
            .cloned()
            .ok_or_else(|| ZoneCtlError::PoolNotFound {
                pool_id: pool_id.to_string(),
            })
    }
}
