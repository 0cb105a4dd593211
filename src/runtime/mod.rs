//! Worker process runtime
//!
//! Service lifecycle and shutdown signalling.

pub mod service;
pub mod shutdown;

pub use service::Service;
pub use shutdown::ShutdownSignal;
