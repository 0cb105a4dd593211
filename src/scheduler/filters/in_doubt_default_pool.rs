//! Prefers the default pool when several candidates remain.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Filter;
use crate::error::Result;
use crate::objects::{Pool, RequestContext, Zone};
use crate::storage::Storage;

pub const NAME: &str = "in_doubt_default_pool";

pub struct InDoubtDefaultPoolFilter {
    storage: Arc<dyn Storage>,
    default_pool_id: Uuid,
}

impl InDoubtDefaultPoolFilter {
    pub fn new(storage: Arc<dyn Storage>, default_pool_id: Uuid) -> Self {
        Self {
            storage,
            default_pool_id,
        }
    }
}

#[async_trait]
impl Filter for InDoubtDefaultPoolFilter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn filter(&self, ctx: &RequestContext, pools: Vec<Pool>, zone: &Zone) -> Result<Vec<Pool>> {
        if pools.len() <= 1 {
            return Ok(pools);
        }
        let default = match self.storage.get_pool(ctx, self.default_pool_id).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, pool = %self.default_pool_id, "default pool lookup failed, leaving candidates as-is");
                return Ok(pools);
            }
        };
        if pools.iter().any(|p| p.id == default.id) {
            debug!(zone = %zone.name, pool = %default.id, "several candidates, choosing default pool");
            Ok(vec![default])
        } else {
            Ok(pools)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_collapses_to_default() {
        let default = Pool::new("default");
        let other = Pool::new("other");
        let storage = Arc::new(MemoryStorage::with_pools([default.clone(), other.clone()]));
        let filter = InDoubtDefaultPoolFilter::new(storage.clone(), default.id);
        let ctx = RequestContext::admin();
        let zone = Zone::new("example.org.");

        let out = filter
            .filter(&ctx, vec![other.clone(), default.clone()], &zone)
            .await
            .unwrap();
        assert_eq!(out, vec![default.clone()]);

        let single = filter.filter(&ctx, vec![other.clone()], &zone).await.unwrap();
        assert_eq!(single, vec![other.clone()]);

        storage.fail_next(1);
        let both = vec![other, default];
        assert_eq!(filter.filter(&ctx, both.clone(), &zone).await.unwrap(), both);
    }
}
