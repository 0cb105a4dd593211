//! Pool storage
//!
//! Read-only access to the configured nameserver pools, used by the
//! scheduler and its filters.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::objects::{Pool, RequestContext};

pub use memory::MemoryStorage;

/// Pool lookups the scheduler depends on
#[async_trait]
pub trait Storage: Send + Sync {
    /// Every pool visible to `ctx`, in a stable order
    async fn find_pools(&self, ctx: &RequestContext) -> Result<Vec<Pool>>;

    /// A single pool; `PoolNotFound` when it does not exist
    async fn get_pool(&self, ctx: &RequestContext, pool_id: Uuid) -> Result<Pool>;
}
