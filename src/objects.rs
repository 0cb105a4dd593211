//! Zone, pool and request-context value types
//!
//! These are read-only inputs to the locking and scheduling layers; they are
//! owned and persisted elsewhere.

use std::collections::BTreeMap;
use uuid::Uuid;

/// Zone attribute carrying an explicit pool request.
pub const POOL_ID_ATTRIBUTE: &str = "pool_id";

/// Zone kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneType {
    /// Records are managed here
    #[default]
    Primary,
    /// Records are transferred from external masters
    Secondary,
}

/// A DNS zone as seen by the control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    pub zone_type: ZoneType,
    /// Scheduling hints (`pool_id` and arbitrary key/value tags)
    pub attributes: BTreeMap<String, String>,
}

impl Zone {
    /// Create a primary zone with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            zone_type: ZoneType::Primary,
            attributes: BTreeMap::new(),
        }
    }

    /// Add a scheduling hint
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Pool explicitly requested through the `pool_id` hint
    pub fn requested_pool_id(&self) -> Option<&str> {
        self.attributes.get(POOL_ID_ATTRIBUTE).map(String::as_str)
    }

    /// Shard this zone falls into
    pub fn shard(&self) -> u32 {
        zone_shard(&self.id)
    }
}

/// Shard of a zone: the first three hex digits of its id (0..=4095).
pub fn zone_shard(zone_id: &Uuid) -> u32 {
    (zone_id.as_u128() >> 116) as u32
}

/// A backend nameserver pool eligible to host zones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub id: Uuid,
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub nameservers: Vec<String>,
    pub targets: Vec<String>,
}

impl Pool {
    /// Pool reference carrying only an id
    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            name: String::new(),
            attributes: BTreeMap::new(),
            nameservers: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Named pool with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::with_id(Uuid::new_v4())
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Caller identity for policy checks and storage lookups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub project_id: Option<String>,
    pub roles: Vec<String>,
}

impl RequestContext {
    /// Context for a project member
    pub fn new(project_id: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            request_id: format!("req-{}", Uuid::new_v4()),
            project_id: Some(project_id.into()),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Context with the admin role and no project scope
    pub fn admin() -> Self {
        Self {
            request_id: format!("req-{}", Uuid::new_v4()),
            project_id: None,
            roles: vec!["admin".to_string()],
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
