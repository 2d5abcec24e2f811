//! Symmetric encryption for secrets stored at rest.

pub mod token_cipher;

pub use token_cipher::TokenCipher;
