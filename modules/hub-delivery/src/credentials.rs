//! Agent/partner credential encryption at rest.
//!
//! Grounded on `EffortlessMetrics-shipper`'s `shipper-encrypt` crate: the
//! teacher carries no encryption dependency at all, and partner API keys
//! and OAuth secrets stored in `agent_credentials` are exactly the kind of
//! thing that crate exists to protect, so we import its approach wholesale
//! rather than inventing a scheme — AES-256-GCM, PBKDF2-derived key, random
//! salt and nonce per encryption, `base64(salt || nonce || ciphertext)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac_array;
use rand::RngCore;
use sha2::Sha256;

use hub_common::{HubError, Result};

const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const PBKDF2_ITERATIONS: u32 = 100_000;
const KEY_SIZE: usize = 32;

/// Wraps a single passphrase (`CREDENTIALS_ENCRYPTION_KEY`) and encrypts or
/// decrypts arbitrary credential blobs against it.
#[derive(Clone)]
pub struct CredentialCipher {
    passphrase: String,
}

impl CredentialCipher {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        let mut rng = rand::rngs::OsRng;
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce_bytes);

        let key_bytes =
            pbkdf2_hmac_array::<Sha256, KEY_SIZE>(self.passphrase.as_bytes(), &salt, PBKDF2_ITERATIONS);
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| HubError::Other(anyhow::anyhow!("bad key length: {e}")))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| HubError::Other(anyhow::anyhow!("encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&salt);
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| HubError::Other(anyhow::anyhow!("invalid base64: {e}")))?;
        if combined.len() < SALT_SIZE + NONCE_SIZE {
            return Err(HubError::Other(anyhow::anyhow!("ciphertext too short")));
        }
        let (salt, rest) = combined.split_at(SALT_SIZE);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

        let key_bytes =
            pbkdf2_hmac_array::<Sha256, KEY_SIZE>(self.passphrase.as_bytes(), salt, PBKDF2_ITERATIONS);
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| HubError::Other(anyhow::anyhow!("bad key length: {e}")))?;
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| HubError::Other(anyhow::anyhow!("decryption failed: {e}")))
    }

    pub fn encrypt_str(&self, plaintext: &str) -> Result<String> {
        self.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt_str(&self, encoded: &str) -> Result<String> {
        let bytes = self.decrypt(encoded)?;
        String::from_utf8(bytes).map_err(|e| HubError::Other(anyhow::anyhow!("not utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_secret() {
        let cipher = CredentialCipher::new("test-passphrase");
        let encrypted = cipher.encrypt_str("sk-partner-secret-123").unwrap();
        assert_ne!(encrypted, "sk-partner-secret-123");
        assert_eq!(cipher.decrypt_str(&encrypted).unwrap(), "sk-partner-secret-123");
    }

    #[test]
    fn rejects_wrong_passphrase() {
        let encrypted = CredentialCipher::new("right").encrypt_str("secret").unwrap();
        assert!(CredentialCipher::new("wrong").decrypt_str(&encrypted).is_err());
    }
}
