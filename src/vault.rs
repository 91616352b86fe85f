// Credential vault - provider API keys encrypted at rest
//
// Blob layout is salt || nonce || tag || ciphertext, base64-encoded. The
// AES-256 key is re-derived on every operation from the process-wide master
// secret and a fresh random salt (PBKDF2-HMAC-SHA512, 100k iterations), so no
// two encryptions of the same plaintext produce the same blob.

use aes_gcm::aead::generic_array::{typenum::U16, GenericArray};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{aes::Aes256, AesGcm};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha512;

use crate::error::{Result, ShieldError};

const SALT_LENGTH: usize = 64;
const NONCE_LENGTH: usize = 16;
const TAG_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Environment variable holding the master secret.
pub const MASTER_SECRET_ENV: &str = "SHIELDGATE_ENCRYPTION_KEY";

// AES-256-GCM with a 16-byte nonce, matching the persisted blob format.
type VaultCipher = AesGcm<Aes256, U16>;

pub struct CredentialVault {
    master_secret: String,
}

impl CredentialVault {
    pub fn new(master_secret: impl Into<String>) -> Result<Self> {
        let master_secret = master_secret.into();
        if master_secret.trim().is_empty() {
            return Err(ShieldError::Crypto("master secret is empty".to_string()));
        }
        Ok(Self { master_secret })
    }

    /// Read the master secret from the environment. Absence is fatal: the
    /// vault refuses to exist rather than run with a missing key.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var(MASTER_SECRET_ENV)
            .map_err(|_| ShieldError::Crypto(format!("{} not configured", MASTER_SECRET_ENV)))?;
        Self::new(secret)
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LENGTH] {
        let mut key = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha512>(
            self.master_secret.as_bytes(),
            salt,
            PBKDF2_ITERATIONS,
            &mut key,
        );
        key
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = self.derive_key(&salt);
        let cipher = VaultCipher::new_from_slice(&key)
            .map_err(|_| ShieldError::Crypto("invalid derived key length".to_string()))?;
        let nonce = GenericArray::from_slice(&nonce_bytes);

        // aes-gcm appends the tag to the ciphertext; the stored layout keeps
        // the tag in front of it instead.
        let sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| ShieldError::Crypto("encryption failed".to_string()))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);

        let mut blob =
            Vec::with_capacity(SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(tag);
        blob.extend_from_slice(ciphertext);

        Ok(STANDARD.encode(blob))
    }

    /// Fails closed: a truncated blob or a tag mismatch is an error, never
    /// partially recovered plaintext.
    pub fn decrypt(&self, blob: &str) -> Result<String> {
        let raw = STANDARD
            .decode(blob)
            .map_err(|_| ShieldError::Crypto("blob is not valid base64".to_string()))?;

        if raw.len() < SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH {
            return Err(ShieldError::Crypto("blob is truncated".to_string()));
        }

        let (salt, rest) = raw.split_at(SALT_LENGTH);
        let (nonce_bytes, rest) = rest.split_at(NONCE_LENGTH);
        let (tag, ciphertext) = rest.split_at(TAG_LENGTH);

        let key = self.derive_key(salt);
        let cipher = VaultCipher::new_from_slice(&key)
            .map_err(|_| ShieldError::Crypto("invalid derived key length".to_string()))?;
        let nonce = GenericArray::from_slice(nonce_bytes);

        let mut sealed = ciphertext.to_vec();
        sealed.extend_from_slice(tag);

        let plaintext = cipher
            .decrypt(nonce, sealed.as_ref())
            .map_err(|_| ShieldError::Crypto("authentication tag mismatch".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| ShieldError::Crypto("decrypted payload is not valid UTF-8".to_string()))
    }

    /// Display-safe rendering. Cosmetic only, never a security boundary.
    pub fn mask(key: &str) -> String {
        let chars: Vec<char> = key.chars().collect();
        if chars.len() <= 8 {
            return "***".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}
