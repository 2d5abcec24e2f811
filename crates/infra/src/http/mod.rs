//! Shared HTTP plumbing for provider clients

pub mod client;

pub use client::{HttpClient, HttpClientBuilder, TransportError};
