//! Final tie-break: one candidate chosen uniformly at random.

use async_trait::async_trait;
use rand::Rng;

use super::Filter;
use crate::error::Result;
use crate::objects::{Pool, RequestContext, Zone};

pub const NAME: &str = "random";

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomFilter;

#[async_trait]
impl Filter for RandomFilter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn filter(&self, _ctx: &RequestContext, mut pools: Vec<Pool>, _zone: &Zone) -> Result<Vec<Pool>> {
        if pools.len() <= 1 {
            return Ok(pools);
        }
        let index = rand::rng().random_range(0..pools.len());
        Ok(vec![pools.swap_remove(index)])
    }
}
