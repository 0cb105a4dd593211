//! Honours a zone's explicit `pool_id` request.
//!
//! Forcing a pool is a privileged operation guarded by the
//! `zone_create_forced_pool` policy rule. A denied or unknown request is
//! reported to the caller instead of being replaced by another pool.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Filter;
use crate::error::{Result, ZoneCtlError};
use crate::objects::{Pool, RequestContext, Zone};
use crate::policy::{Policy, PolicyTarget, ZONE_CREATE_FORCED_POOL};
use crate::storage::Storage;

pub const NAME: &str = "pool_id_attribute";

pub struct PoolIdAttributeFilter {
    storage: Arc<dyn Storage>,
    policy: Arc<dyn Policy>,
}

impl PoolIdAttributeFilter {
    pub fn new(storage: Arc<dyn Storage>, policy: Arc<dyn Policy>) -> Self {
        Self { storage, policy }
    }
}

#[async_trait]
impl Filter for PoolIdAttributeFilter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn filter(&self, ctx: &RequestContext, pools: Vec<Pool>, zone: &Zone) -> Result<Vec<Pool>> {
        let Some(requested) = zone.requested_pool_id() else {
            return Ok(pools);
        };
        let pool_id = Uuid::parse_str(requested).map_err(|_| ZoneCtlError::PoolNotFound {
            pool_id: requested.to_string(),
        })?;

        let pool = match self.storage.get_pool(ctx, pool_id).await {
            Ok(pool) => pool,
            Err(e @ ZoneCtlError::PoolNotFound { .. }) => return Err(e),
            Err(e) => {
                warn!(error = %e, pool = %pool_id, "pool lookup failed, no pool matches the request");
                return Ok(Vec::new());
            }
        };

        let target = PolicyTarget {
            project_id: ctx.project_id.clone(),
            zone_id: Some(zone.id),
            pool_id: Some(pool.id),
        };
        self.policy.check(ZONE_CREATE_FORCED_POOL, ctx, &target)?;

        if pools.iter().any(|candidate| candidate.id == pool.id) {
            debug!(zone = %zone.name, pool = %pool.id, "using requested pool");
            Ok(vec![pool])
        } else {
            debug!(zone = %zone.name, pool = %pool.id, "requested pool is not a candidate");
            Ok(Vec::new())
        }
    }
}
