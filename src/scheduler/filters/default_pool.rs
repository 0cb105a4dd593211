//! Always schedules onto the configured default pool.

use async_trait::async_trait;
use uuid::Uuid;

use super::Filter;
use crate::error::Result;
use crate::objects::{Pool, RequestContext, Zone};

pub const NAME: &str = "default_pool";

/// Ignores its input and returns the default pool
#[derive(Debug, Clone, Copy)]
pub struct DefaultPoolFilter {
    default_pool_id: Uuid,
}

impl DefaultPoolFilter {
    pub fn new(default_pool_id: Uuid) -> Self {
        Self { default_pool_id }
    }
}

#[async_trait]
impl Filter for DefaultPoolFilter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn filter(&self, _ctx: &RequestContext, _pools: Vec<Pool>, _zone: &Zone) -> Result<Vec<Pool>> {
        Ok(vec![Pool::with_id(self.default_pool_id)])
    }
}
