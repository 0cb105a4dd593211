//! Lock names for zone resources
//!
//! A guarded operation names its zone either directly or through its
//! arguments. Arguments are searched in priority order: an explicit zone id,
//! then an object that references a zone, then a positional string that
//! parses as a zone id.

use std::fmt;
use uuid::Uuid;

use crate::error::{Result, ZoneCtlError};
use crate::objects::Zone;

/// Lock name shared by every "create a new zone" operation.
pub const NEW_ZONE_LOCK_NAME: &str = "create-new-zone";

/// Resource a zone lock is taken on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    /// An existing zone
    Zone(Uuid),
    /// A zone that has no id yet
    NewZone,
}

impl ResourceId {
    /// Name of the distributed lock guarding this resource
    pub fn lock_name(&self) -> String {
        match self {
            ResourceId::Zone(id) => format!("zone-{}", id),
            ResourceId::NewZone => NEW_ZONE_LOCK_NAME.to_string(),
        }
    }

    /// Derive the resource from an operation's arguments.
    ///
    /// `new_zone` short-circuits to [`ResourceId::NewZone`]. Failing to find
    /// a zone id is an error; the operation must not run unguarded.
    pub fn derive(operation: &str, args: &[LockArg<'_>], new_zone: bool) -> Result<Self> {
        if new_zone {
            return Ok(ResourceId::NewZone);
        }

        let explicit = args.iter().find_map(|arg| match arg {
            LockArg::ZoneId(id) => Some(*id),
            _ => None,
        });
        let referenced = || {
            args.iter().find_map(|arg| match arg {
                LockArg::Object(object) => object.zone_id(),
                _ => None,
            })
        };
        let positional = || {
            args.iter().find_map(|arg| match arg {
                LockArg::Positional(value) => Uuid::parse_str(value).ok(),
                _ => None,
            })
        };

        explicit
            .or_else(referenced)
            .or_else(positional)
            .map(ResourceId::Zone)
            .ok_or_else(|| ZoneCtlError::ResourceIdUnresolved {
                operation: operation.to_string(),
            })
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lock_name())
    }
}

/// Anything that refers to a zone
pub trait ZoneScoped: Sync {
    fn zone_id(&self) -> Option<Uuid>;
}

impl ZoneScoped for Zone {
    fn zone_id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

/// One argument of a guarded operation, as seen by lock-name derivation
#[derive(Clone, Copy)]
pub enum LockArg<'a> {
    /// Explicit zone id argument
    ZoneId(Uuid),
    /// Object carrying a zone reference (a zone, a record set, ...)
    Object(&'a dyn ZoneScoped),
    /// Positional string argument
    Positional(&'a str),
}

impl fmt::Debug for LockArg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockArg::ZoneId(id) => f.debug_tuple("ZoneId").field(id).finish(),
            LockArg::Object(object) => f.debug_tuple("Object").field(&object.zone_id()).finish(),
            LockArg::Positional(value) => f.debug_tuple("Positional").field(value).finish(),
        }
    }
}
