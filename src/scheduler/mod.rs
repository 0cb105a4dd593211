//! Pool scheduler
//!
//! Runs an ordered chain of [`Filter`]s over the candidate pools to pick
//! the pool a new zone is created on. The chain is fixed when the
//! scheduler is built.

pub mod filters;

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{Result, ZoneCtlError};
use crate::metrics::standard;
use crate::objects::{Pool, RequestContext, Zone};
use crate::policy::Policy;
use crate::storage::Storage;

pub use filters::{build_filter, Filter, FilterDeps, KNOWN_FILTERS};

/// Filter chain over the pools in storage
pub struct Scheduler {
    storage: Arc<dyn Storage>,
    filters: Vec<Arc<dyn Filter>>,
}

impl Scheduler {
    /// Build the chain named in `config`
    pub fn new(storage: Arc<dyn Storage>, policy: Arc<dyn Policy>, config: &SchedulerConfig) -> Result<Self> {
        let deps = FilterDeps {
            storage: storage.clone(),
            policy,
            default_pool_id: config.default_pool_id,
        };
        let filters = config
            .filters
            .iter()
            .map(|name| build_filter(name, &deps))
            .collect::<Result<Vec<_>>>()?;
        Self::with_filters(storage, filters)
    }

    /// Scheduler over an explicit chain
    pub fn with_filters(storage: Arc<dyn Storage>, filters: Vec<Arc<dyn Filter>>) -> Result<Self> {
        if filters.is_empty() {
            return Err(ZoneCtlError::NoFiltersConfigured);
        }
        info!(
            filters = ?filters.iter().map(|f| f.name()).collect::<Vec<_>>(),
            "scheduler filter chain configured"
        );
        Ok(Self { storage, filters })
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run the chain over every pool in storage
    pub async fn filter(&self, ctx: &RequestContext, zone: &Zone) -> Result<Vec<Pool>> {
        let pools = self.storage.find_pools(ctx).await?;
        self.filter_pools(ctx, pools, zone).await
    }

    /// Run the chain over `pools`, threading each filter's output into the next
    pub async fn filter_pools(&self, ctx: &RequestContext, mut pools: Vec<Pool>, zone: &Zone) -> Result<Vec<Pool>> {
        for filter in &self.filters {
            pools = filter.filter(ctx, pools, zone).await?;
            debug!(
                filter = filter.name(),
                zone = %zone.name,
                remaining = pools.len(),
                "scheduler filter applied"
            );
        }
        Ok(pools)
    }

    /// Pick exactly one pool for `zone`
    pub async fn schedule_zone(&self, ctx: &RequestContext, zone: &Zone) -> Result<Uuid> {
        let candidates = self.storage.find_pools(ctx).await?;
        if candidates.is_empty() {
            return Err(ZoneCtlError::NoValidPoolFound);
        }

        let pools = self.filter_pools(ctx, candidates, zone).await?;
        match pools.as_slice() {
            [] => Err(ZoneCtlError::NoValidPoolFound),
            [pool] => {
                standard::SCHEDULER_DECISIONS.inc();
                info!(zone = %zone.name, pool = %pool.id, "scheduled zone");
                Ok(pool.id)
            }
            many => Err(ZoneCtlError::MultiplePoolsFound { count: many.len() }),
        }
    }
}
