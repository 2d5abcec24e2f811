//! OAuth adapters: token endpoint client and authorization state cache

pub mod state_store;
pub mod token_client;

pub use state_store::{AuthStateCacheConfig, MokaAuthStateStore};
pub use token_client::HttpTokenEndpoint;
