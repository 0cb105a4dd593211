//! Scheduler filters
//!
//! Each filter narrows a candidate pool list for a zone. Filters hold only
//! configuration and read-only collaborators; they never mutate shared
//! state.

pub mod attribute;
pub mod default_pool;
pub mod fallback;
pub mod in_doubt_default_pool;
pub mod pool_id_attribute;
pub mod random;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Result, ZoneCtlError};
use crate::objects::{Pool, RequestContext, Zone};
use crate::policy::Policy;
use crate::storage::Storage;

pub use attribute::AttributeFilter;
pub use default_pool::DefaultPoolFilter;
pub use fallback::FallbackFilter;
pub use in_doubt_default_pool::InDoubtDefaultPoolFilter;
pub use pool_id_attribute::PoolIdAttributeFilter;
pub use random::RandomFilter;

/// Names accepted in a filter chain
pub const KNOWN_FILTERS: &[&str] = &[
    default_pool::NAME,
    fallback::NAME,
    pool_id_attribute::NAME,
    attribute::NAME,
    in_doubt_default_pool::NAME,
    random::NAME,
];

/// One step of the scheduling chain
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Narrow `pools` for `zone`
    async fn filter(&self, ctx: &RequestContext, pools: Vec<Pool>, zone: &Zone) -> Result<Vec<Pool>>;
}

/// Collaborators handed to filters when a chain is built
#[derive(Clone)]
pub struct FilterDeps {
    pub storage: Arc<dyn Storage>,
    pub policy: Arc<dyn Policy>,
    pub default_pool_id: Uuid,
}

/// Instantiate the filter registered under `name`
pub fn build_filter(name: &str, deps: &FilterDeps) -> Result<Arc<dyn Filter>> {
    let filter: Arc<dyn Filter> = match name {
        default_pool::NAME => Arc::new(DefaultPoolFilter::new(deps.default_pool_id)),
        fallback::NAME => Arc::new(FallbackFilter::new(deps.default_pool_id)),
        pool_id_attribute::NAME => Arc::new(PoolIdAttributeFilter::new(
            deps.storage.clone(),
            deps.policy.clone(),
        )),
        attribute::NAME => Arc::new(AttributeFilter),
        in_doubt_default_pool::NAME => Arc::new(InDoubtDefaultPoolFilter::new(
            deps.storage.clone(),
            deps.default_pool_id,
        )),
        random::NAME => Arc::new(RandomFilter),
        other => return Err(ZoneCtlError::UnknownFilter { name: other.to_string() }),
    };
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AllowAll;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_every_known_filter_builds() {
        let deps = FilterDeps {
            storage: Arc::new(MemoryStorage::new()),
            policy: Arc::new(AllowAll),
            default_pool_id: Uuid::new_v4(),
        };
        for name in KNOWN_FILTERS {
            assert_eq!(build_filter(name, &deps).unwrap().name(), *name);
        }
        assert!(matches!(
            build_filter("nearest", &deps),
            Err(ZoneCtlError::UnknownFilter { .. })
        ));
    }
}
