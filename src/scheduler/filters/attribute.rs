//! Matches zone attribute hints against pool attributes.
//!
//! A pool survives when it carries every attribute the zone asks for, with
//! an equal value. `"true"`/`"false"` compare as booleans (case-insensitive);
//! everything else compares as exact strings. The `pool_id` hint belongs to
//! the pool-id filter and is not matched here.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

use super::Filter;
use crate::error::Result;
use crate::objects::{Pool, RequestContext, Zone, POOL_ID_ATTRIBUTE};

pub const NAME: &str = "attribute";

#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeFilter;

impl AttributeFilter {
    fn matches(requested: &BTreeMap<&str, &str>, pool: &Pool) -> bool {
        requested.iter().all(|(key, wanted)| {
            pool.attributes
                .get(*key)
                .is_some_and(|have| values_match(wanted, have))
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn values_match(wanted: &str, have: &str) -> bool {
    match (parse_bool(wanted), parse_bool(have)) {
        (Some(a), Some(b)) => a == b,
        _ => wanted == have,
    }
}

#[async_trait]
impl Filter for AttributeFilter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn filter(&self, _ctx: &RequestContext, pools: Vec<Pool>, zone: &Zone) -> Result<Vec<Pool>> {
        let requested: BTreeMap<&str, &str> = zone
            .attributes
            .iter()
            .filter(|(key, _)| key.as_str() != POOL_ID_ATTRIBUTE)
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        if requested.is_empty() {
            return Ok(pools);
        }

        let before = pools.len();
        let kept: Vec<Pool> = pools
            .into_iter()
            .filter(|pool| Self::matches(&requested, pool))
            .collect();
        debug!(zone = %zone.name, before, after = kept.len(), "attribute filter applied");
        Ok(kept)
    }
}
