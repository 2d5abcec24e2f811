//! PKCE (RFC 7636) verifier/challenge pairs and CSRF state tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// The only challenge method we issue.
pub const CHALLENGE_METHOD: &str = "S256";

const RANDOM_BYTES: usize = 32;

fn random_token() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a random state token for CSRF protection.
///
/// 32 random bytes, base64url without padding (43 characters).
#[must_use]
pub fn generate_state() -> String {
    random_token()
}

/// `BASE64URL(SHA256(verifier))`.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Verifier kept server-side plus the challenge sent with the authorize
/// request.
#[derive(Clone)]
pub struct PkcePair {
    /// Secret presented at token exchange.
    pub verifier: String,
    /// SHA-256 of the verifier, base64url.
    pub challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

impl PkcePair {
    /// Generate a fresh verifier (43 characters, within the 43-128 range) and
    /// its challenge.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_token();
        let challenge = code_challenge(&verifier);
        Self { verifier, challenge }
    }

    /// Always `S256`.
    #[must_use]
    pub fn method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}
