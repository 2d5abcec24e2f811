//! External platform connections: OAuth authorization, token refresh and
//! revocation.

pub mod lifecycle;
pub mod ports;
pub mod registry;

pub use lifecycle::{ConnectionLifecycleManager, LifecycleSettings};
pub use registry::PlatformRegistry;
