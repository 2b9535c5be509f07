//! Passphrase-keyed field cipher built on Argon2id and ChaCha20-Poly1305.
//! Each sealed value is hex encoded as `salt || nonce || ciphertext || tag` so
//! it can sit in a JSON string field next to plaintext metadata.

use std::collections::HashMap;
use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const DERIVED_KEY_LEN: usize = 32;

/// Distinct salts one cipher will derive keys for while opening values.
const MAX_OPEN_SALTS: usize = 4;

const MEMORY_COST_KIB: u32 = 19 * 1024;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 1;

type Salt = [u8; SALT_LEN];

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("argon2 derivation failed: {0}")]
    DerivationFailed(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("malformed ciphertext: {0}")]
    Malformed(String),
    #[error("decrypted value is not valid utf-8: {0}")]
    Utf8(String),
}

/// Encrypts and decrypts string fields with keys derived from one secret.
///
/// The first seal picks a random salt that is reused for every later value,
/// so a store costs one Argon2id run to write. Keys for salts seen while
/// opening are cached for the lifetime of the cipher.
///
/// Every unseen salt costs a full 19 MiB Argon2id derivation, so opening
/// refuses values once `MAX_OPEN_SALTS` distinct salts have been seen. Files
/// written by this cipher carry one salt for the verifier and one for fields.
pub struct SecretCipher {
    secret: Zeroizing<String>,
    seal_salt: Option<Salt>,
    keys: HashMap<Salt, Zeroizing<[u8; DERIVED_KEY_LEN]>>,
}

impl SecretCipher {
    /// Returns `None` for an empty secret; there is nothing to key a cipher with.
    pub fn new(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            secret: Zeroizing::new(secret.to_string()),
            seal_salt: None,
            keys: HashMap::new(),
        })
    }

    /// Seals a plaintext value. Empty input is returned unchanged.
    pub fn encrypt(&mut self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let salt = match self.seal_salt {
            Some(salt) => salt,
            None => {
                let mut salt = [0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                self.seal_salt = Some(salt);
                salt
            }
        };
        let cipher = self.cipher_for(&salt)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::EncryptionFailed(format!("{e}")))?;

        let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + sealed.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(hex::encode(blob))
    }

    /// Opens a value produced by [`SecretCipher::encrypt`]. Empty input is
    /// returned unchanged.
    pub fn decrypt(&mut self, ciphertext: &str) -> Result<String, CipherError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let blob = hex::decode(ciphertext).map_err(|e| CipherError::Malformed(format!("{e}")))?;
        if blob.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(CipherError::Malformed("value shorter than header and tag".to_string()));
        }
        let (salt_bytes, rest) = blob.split_at(SALT_LEN);
        let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(salt_bytes);
        if !self.keys.contains_key(&salt) && self.keys.len() >= MAX_OPEN_SALTS {
            return Err(CipherError::Malformed(format!(
                "more than {MAX_OPEN_SALTS} distinct salts"
            )));
        }

        let cipher = self.cipher_for(&salt)?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce_bytes), sealed)
                .map_err(|e| CipherError::DecryptionFailed(format!("{e}")))?,
        );
        String::from_utf8(plaintext.to_vec()).map_err(|e| CipherError::Utf8(format!("{e}")))
    }

    fn cipher_for(&mut self, salt: &Salt) -> Result<ChaCha20Poly1305, CipherError> {
        if !self.keys.contains_key(salt) {
            let key = derive_key(&self.secret, salt)?;
            self.keys.insert(*salt, key);
        }
        let key = &self.keys[salt];
        Ok(ChaCha20Poly1305::new(Key::from_slice(&key[..])))
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher")
            .field("secret", &"<redacted>")
            .field("cached_keys", &self.keys.len())
            .finish()
    }
}

fn derive_key(secret: &str, salt: &[u8]) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>, CipherError> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(DERIVED_KEY_LEN))
        .map_err(|e| CipherError::DerivationFailed(format!("{e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    argon2
        .hash_password_into(secret.as_bytes(), salt, &mut *output)
        .map_err(|e| CipherError::DerivationFailed(format!("{e}")))?;
    Ok(output)
}

/// One-shot encryption of a single value under `secret`.
pub fn encrypt(secret: &str, plaintext: &str) -> Result<String, CipherError> {
    match SecretCipher::new(secret) {
        Some(mut cipher) => cipher.encrypt(plaintext),
        None => Ok(plaintext.to_string()),
    }
}

/// One-shot decryption of a single value under `secret`.
pub fn decrypt(secret: &str, ciphertext: &str) -> Result<String, CipherError> {
    match SecretCipher::new(secret) {
        Some(mut cipher) => cipher.decrypt(ciphertext),
        None => Ok(ciphertext.to_string()),
    }
}
