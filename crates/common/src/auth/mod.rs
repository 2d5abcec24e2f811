//! OAuth 2.0 client-side helpers.

pub mod pkce;

pub use pkce::{code_challenge, generate_state, PkcePair, CHALLENGE_METHOD};
