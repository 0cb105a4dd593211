//! Zone-level locking

pub mod resource;
pub mod zone_lock;

pub use resource::{LockArg, ResourceId, ZoneScoped, NEW_ZONE_LOCK_NAME};
pub use zone_lock::{held_locks, is_held, ZoneLock};
