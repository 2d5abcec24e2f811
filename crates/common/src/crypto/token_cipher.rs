//! AES-256-GCM cipher for OAuth tokens at rest.
//!
//! Every call to [`TokenCipher::encrypt`] draws a fresh 96-bit nonce, so the
//! same token encrypted twice never produces the same stored value. The
//! stored form is a printable envelope:
//!
//! ```text
//! v1.<base64url nonce>.<base64url ciphertext+tag>
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use orderlink_common::crypto::TokenCipher;
//!
//! let cipher = TokenCipher::from_hex(&TokenCipher::generate_key_hex())?;
//! let sealed = cipher.encrypt("ya29.access-token")?;
//! assert_eq!(cipher.decrypt(&sealed)?, "ya29.access-token");
//! # Ok::<(), orderlink_common::error::CommonError>(())
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{CommonError, CommonResult};

const ENVELOPE_VERSION: &str = "v1";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const MIN_SALT_LEN: usize = 8;

/// Encrypts and decrypts token strings with a single 256-bit key.
pub struct TokenCipher {
    key: Zeroizing<[u8; KEY_LEN]>,
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"[REDACTED]")
            .field("fingerprint", &self.key_fingerprint())
            .finish()
    }
}

impl TokenCipher {
    /// Create a cipher from raw key bytes. The key must be exactly 32 bytes.
    pub fn new(key: &[u8]) -> CommonResult<Self> {
        let bytes: [u8; KEY_LEN] = key.try_into().map_err(|_| {
            CommonError::config("token_key", format!("key must be {KEY_LEN} bytes, got {}", key.len()))
        })?;
        let cipher = Aes256Gcm::new_from_slice(&bytes)
            .map_err(|e| CommonError::crypto(format!("failed to initialise cipher: {e}")))?;
        Ok(Self { key: Zeroizing::new(bytes), cipher })
    }

    /// Create a cipher from a 64-character hex key.
    pub fn from_hex(hex_key: &str) -> CommonResult<Self> {
        let bytes = Zeroizing::new(
            hex::decode(hex_key.trim())
                .map_err(|e| CommonError::config("token_key", format!("invalid hex key: {e}")))?,
        );
        Self::new(&bytes)
    }

    /// Derive the key from a passphrase and salt with Argon2id.
    pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> CommonResult<Self> {
        if salt.len() < MIN_SALT_LEN {
            return Err(CommonError::config(
                "token_salt",
                format!("salt must be at least {MIN_SALT_LEN} bytes"),
            ));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, key.as_mut())
            .map_err(|e| CommonError::crypto(format!("key derivation failed: {e}")))?;
        Self::new(key.as_ref())
    }

    /// Generate a random key, hex encoded, suitable for `ORDERLINK_TOKEN_KEY`.
    #[must_use]
    pub fn generate_key_hex() -> String {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        rand::thread_rng().fill_bytes(key.as_mut());
        hex::encode(key.as_ref())
    }

    /// Encrypt a plaintext token into the `v1.` envelope.
    pub fn encrypt(&self, plaintext: &str) -> CommonResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CommonError::crypto(format!("encryption failed: {e}")))?;

        Ok(format!(
            "{ENVELOPE_VERSION}.{}.{}",
            URL_SAFE_NO_PAD.encode(nonce_bytes),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    /// Decrypt a `v1.` envelope back into the plaintext token.
    ///
    /// Fails on an unknown version, malformed encoding, a wrong key or a
    /// tampered ciphertext.
    pub fn decrypt(&self, sealed: &str) -> CommonResult<String> {
        let mut parts = sealed.splitn(3, '.');
        let (Some(version), Some(nonce_b64), Some(ct_b64)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CommonError::crypto("malformed token envelope"));
        };
        if version != ENVELOPE_VERSION {
            return Err(CommonError::crypto(format!("unsupported envelope version '{version}'")));
        }

        let nonce = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|e| CommonError::crypto(format!("invalid nonce encoding: {e}")))?;
        if nonce.len() != NONCE_LEN {
            return Err(CommonError::crypto("invalid nonce length"));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ct_b64)
            .map_err(|e| CommonError::crypto(format!("invalid ciphertext encoding: {e}")))?;

        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
                .map_err(|_| CommonError::crypto("decryption failed: wrong key or tampered data"))?,
        );

        String::from_utf8(plaintext.to_vec())
            .map_err(|e| CommonError::crypto(format!("decrypted token is not UTF-8: {e}")))
    }

    /// Short, non-reversible identifier of the current key.
    #[must_use]
    pub fn key_fingerprint(&self) -> String {
        let digest = Sha256::digest(self.key.as_ref());
        hex::encode(&digest[..8])
    }
}
