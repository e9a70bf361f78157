//! Decryption of the tracker's encrypted dataset pages.
//!
//! Each page is a JSON envelope of base64 fields:
//!
//! - `salt`: PBKDF2 salt
//! - `iv`: 96-bit AES-GCM nonce
//! - `ciphertext`: AES-256-GCM ciphertext with the 16-byte tag appended
//!
//! The key is PBKDF2-HMAC-SHA256 over the shared passphrase and the page
//! salt (100 000 rounds, 32 bytes). Pages usually share a salt, so derived
//! keys are memoized per salt for the life of the process. Keys are held in
//! zeroizing memory and never leave this module.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use platecheck_core::config::Secret;
use platecheck_core::error::{AppError, DecryptError};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

/// PBKDF2 iteration count used by the tracker.
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Length of the derived key in bytes (256 bits).
pub const KEY_LENGTH: usize = 32;

/// Length of the nonce in bytes.
pub const IV_LENGTH: usize = 12;

const TAG_LENGTH: usize = 16;
const SALT_LENGTH: usize = 16;

/// Encrypted page envelope as served upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPage {
    pub salt: String,
    pub iv: String,
    pub ciphertext: String,
}

impl EncryptedPage {
    pub fn from_json(body: &str) -> Result<Self, DecryptError> {
        serde_json::from_str(body)
            .map_err(|e| DecryptError::Corrupt(format!("invalid page envelope: {e}")))
    }
}

type Key = Zeroizing<[u8; KEY_LENGTH]>;

/// Derive the page key for a passphrase and salt.
pub fn derive_key(passphrase: &str, salt: &[u8], rounds: u32) -> Key {
    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, rounds, &mut key[..]);
    key
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>, DecryptError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| DecryptError::Corrupt(format!("{field} is not valid base64: {e}")))
}

/// Decrypts pages with one passphrase, caching a key per distinct salt.
#[derive(Clone)]
pub struct PageCipher {
    passphrase: Secret,
    rounds: u32,
    keys: Arc<Mutex<HashMap<Vec<u8>, Arc<Key>>>>,
}

impl fmt::Debug for PageCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCipher")
            .field("passphrase", &self.passphrase)
            .field("rounds", &self.rounds)
            .field("cached_keys", &self.cached_keys())
            .finish()
    }
}

impl PageCipher {
    pub fn new(passphrase: Secret) -> Self {
        Self::with_rounds(passphrase, PBKDF2_ROUNDS)
    }

    /// Non-default iteration counts are only useful for fixtures.
    pub fn with_rounds(passphrase: Secret, rounds: u32) -> Self {
        Self {
            passphrase,
            rounds,
            keys: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cached_keys(&self) -> usize {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn key_for(&self, salt: &[u8]) -> Arc<Key> {
        if let Some(key) = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(salt)
        {
            return Arc::clone(key);
        }
        let key = Arc::new(derive_key(self.passphrase.expose(), salt, self.rounds));
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(salt.to_vec(), Arc::clone(&key));
        key
    }

    /// Decrypt a page to its UTF-8 plaintext.
    ///
    /// Authentication failure is `BadKey`; anything structurally wrong with
    /// the envelope or plaintext is `Corrupt`. CPU-bound: see
    /// [`PageCipher::decrypt_blocking`] from async code.
    pub fn decrypt(&self, page: &EncryptedPage) -> Result<String, DecryptError> {
        let salt = decode("salt", &page.salt)?;
        let iv = decode("iv", &page.iv)?;
        let ciphertext = decode("ciphertext", &page.ciphertext)?;

        if salt.is_empty() {
            return Err(DecryptError::Corrupt("empty salt".into()));
        }
        if iv.len() != IV_LENGTH {
            return Err(DecryptError::Corrupt(format!(
                "iv is {} bytes, expected {IV_LENGTH}",
                iv.len()
            )));
        }
        if ciphertext.len() < TAG_LENGTH {
            return Err(DecryptError::Corrupt("ciphertext shorter than tag".into()));
        }

        let key = self.key_for(&salt);
        let cipher = Aes256Gcm::new((&**key).into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| DecryptError::BadKey)?;

        String::from_utf8(plaintext)
            .map_err(|_| DecryptError::Corrupt("plaintext is not UTF-8".into()))
    }

    /// [`PageCipher::decrypt`] on the blocking thread pool.
    pub async fn decrypt_blocking(&self, page: EncryptedPage) -> Result<String, AppError> {
        let cipher = self.clone();
        tokio::task::spawn_blocking(move || cipher.decrypt(&page))
            .await
            .map_err(|e| DecryptError::Corrupt(format!("decrypt task failed: {e}")))?
            .map_err(AppError::from)
    }
}

/// Encrypt a plaintext page the way the tracker does, with a fresh salt and IV.
pub fn encrypt_page(plaintext: &str, passphrase: &str, rounds: u32) -> EncryptedPage {
    let mut salt = [0u8; SALT_LENGTH];
    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);
    encrypt_page_with(plaintext, passphrase, rounds, &salt, &iv)
}

/// Deterministic variant of [`encrypt_page`].
pub fn encrypt_page_with(
    plaintext: &str,
    passphrase: &str,
    rounds: u32,
    salt: &[u8],
    iv: &[u8; IV_LENGTH],
) -> EncryptedPage {
    let key = derive_key(passphrase, salt, rounds);
    let cipher = Aes256Gcm::new((&*key).into());
    // Encryption only fails for plaintexts beyond the GCM length limit.
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(iv), plaintext.as_bytes())
        .unwrap_or_default();
    EncryptedPage {
        salt: STANDARD.encode(salt),
        iv: STANDARD.encode(iv),
        ciphertext: STANDARD.encode(ciphertext),
    }
}
