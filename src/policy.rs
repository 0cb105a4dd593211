//! Authorization checks
//!
//! Filters ask the policy before honouring privileged requests, such as a
//! zone forcing its own pool.

use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, ZoneCtlError};
use crate::objects::RequestContext;

/// Rule guarding an explicit `pool_id` request on zone creation.
pub const ZONE_CREATE_FORCED_POOL: &str = "zone_create_forced_pool";

/// Role that passes every rule.
pub const ADMIN_ROLE: &str = "admin";

/// What a policy decision is about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTarget {
    pub project_id: Option<String>,
    pub zone_id: Option<Uuid>,
    pub pool_id: Option<Uuid>,
}

/// Authorization collaborator
pub trait Policy: Send + Sync {
    /// `Ok(())` when allowed, `Forbidden` otherwise
    fn check(&self, rule: &str, ctx: &RequestContext, target: &PolicyTarget) -> Result<()>;
}

/// Allows everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Policy for AllowAll {
    fn check(&self, _rule: &str, _ctx: &RequestContext, _target: &PolicyTarget) -> Result<()> {
        Ok(())
    }
}

/// Role-based rules.
///
/// A registered rule passes when the caller has any of its roles. Rules
/// that are not registered fall back to admin-or-owner: admins pass, and so
/// does a caller whose project owns the target.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    rules: HashMap<String, Vec<String>>,
}

impl RolePolicy {
    /// Policy with no registered rules
    pub fn empty() -> Self {
        Self { rules: HashMap::new() }
    }

    /// Register `rule`, replacing any previous roles for it
    pub fn with_rule(mut self, rule: &str, roles: &[&str]) -> Self {
        self.rules
            .insert(rule.to_string(), roles.iter().map(|r| r.to_string()).collect());
        self
    }

    fn admin_or_owner(ctx: &RequestContext, target: &PolicyTarget) -> bool {
        if ctx.has_role(ADMIN_ROLE) {
            return true;
        }
        matches!(
            (&ctx.project_id, &target.project_id),
            (Some(caller), Some(owner)) if caller == owner
        )
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self::empty().with_rule(ZONE_CREATE_FORCED_POOL, &[ADMIN_ROLE])
    }
}

impl Policy for RolePolicy {
    fn check(&self, rule: &str, ctx: &RequestContext, target: &PolicyTarget) -> Result<()> {
        let allowed = match self.rules.get(rule) {
            Some(roles) => roles.iter().any(|role| ctx.has_role(role)),
            None => Self::admin_or_owner(ctx, target),
        };
        if allowed {
            debug!(rule, request = %ctx.request_id, "policy check passed");
            Ok(())
        } else {
            warn!(rule, request = %ctx.request_id, ?target, "policy check denied");
            Err(ZoneCtlError::Forbidden { rule: rule.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_pool_requires_admin() {
        let policy = RolePolicy::default();
        let target = PolicyTarget::default();

        assert!(policy
            .check(ZONE_CREATE_FORCED_POOL, &RequestContext::admin(), &target)
            .is_ok());
        assert_eq!(
            policy.check(
                ZONE_CREATE_FORCED_POOL,
                &RequestContext::new("p1", &["member"]),
                &target
            ),
            Err(ZoneCtlError::Forbidden {
                rule: ZONE_CREATE_FORCED_POOL.into()
            })
        );
    }

    #[test]
    fn test_unregistered_rule_is_admin_or_owner() {
        let policy = RolePolicy::empty();
        let target = PolicyTarget {
            project_id: Some("p1".into()),
            ..Default::default()
        };

        assert!(policy.check("get_zone", &RequestContext::new("p1", &[]), &target).is_ok());
        assert!(policy.check("get_zone", &RequestContext::new("p2", &[]), &target).is_err());
        assert!(policy.check("get_zone", &RequestContext::admin(), &target).is_ok());
    }
}
