//! Falls back to the default pool when nothing else is left.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::Filter;
use crate::error::Result;
use crate::objects::{Pool, RequestContext, Zone};

pub const NAME: &str = "fallback";

#[derive(Debug, Clone, Copy)]
pub struct FallbackFilter {
    default_pool_id: Uuid,
}

impl FallbackFilter {
    pub fn new(default_pool_id: Uuid) -> Self {
        Self { default_pool_id }
    }
}

#[async_trait]
impl Filter for FallbackFilter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn filter(&self, _ctx: &RequestContext, pools: Vec<Pool>, zone: &Zone) -> Result<Vec<Pool>> {
        if !pools.is_empty() {
            return Ok(pools);
        }
        debug!(zone = %zone.name, pool = %self.default_pool_id, "no candidates left, using default pool");
        Ok(vec![Pool::with_id(self.default_pool_id)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_and_fallback() {
        let default = Uuid::new_v4();
        let filter = FallbackFilter::new(default);
        let ctx = RequestContext::admin();
        let zone = Zone::new("example.org.");

        let pools = vec![Pool::new("a"), Pool::new("b")];
        assert_eq!(filter.filter(&ctx, pools.clone(), &zone).await.unwrap(), pools);

        let fallback = filter.filter(&ctx, Vec::new(), &zone).await.unwrap();
        assert_eq!(fallback, vec![Pool::with_id(default)]);
    }
}
