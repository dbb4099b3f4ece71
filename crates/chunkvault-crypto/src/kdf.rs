//! Key derivation: scrypt password + salt → symmetric key

use rand::RngCore;
use scrypt::Params;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use chunkvault_core::{VaultError, VaultResult};

use crate::{KEY_SIZE, SALT_SIZE};

/// A 256-bit key derived from a password via scrypt.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// scrypt work factors, fixed at build time.
///
/// Identical (password, salt, params) must produce identical keys across
/// runs and platforms; every persisted salt depends on these staying stable.
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Cost exponent: N = 2^log_n (default: 14)
    pub log_n: u8,
    /// Block size (default: 8)
    pub r: u32,
    /// Parallelism (default: 1)
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: 14,
            r: 8,
            p: 1,
        }
    }
}

/// Derive a 256-bit key from a password and a 16-byte salt using scrypt.
///
/// Deterministic: the same (password, salt, params) always yields the same
/// key. The salt is stored alongside the encrypted data; it is not secret.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> VaultResult<DerivedKey> {
    let scrypt_params = Params::new(params.log_n, params.r, params.p, KEY_SIZE)
        .map_err(|e| VaultError::KeyDerivation(format!("invalid scrypt params: {e}")))?;

    let mut key = [0u8; KEY_SIZE];
    scrypt::scrypt(
        password.expose_secret().as_bytes(),
        salt,
        &scrypt_params,
        &mut key,
    )
    .map_err(|e| VaultError::KeyDerivation(format!("scrypt failed: {e}")))?;

    Ok(DerivedKey::from_bytes(key))
}

/// Draw a fresh random 16-byte salt from the thread-local CSPRNG.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
