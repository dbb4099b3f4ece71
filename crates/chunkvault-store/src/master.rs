//! Master wrap: the manifest encrypted as a single chunk
//!
//! The serialized manifest is treated as a one-chunk "file" keyed by the
//! operator's master password. The wrapped blob lives under a fixed name so
//! decryption can find it without the manifest; the master salt is stored
//! next to it in cleartext (the salt is not secret, the password is).

use std::fs;
use std::path::Path;

use secrecy::SecretString;

use chunkvault_core::{VaultError, VaultResult};
use chunkvault_crypto::{chunk, derive_key, generate_salt, KdfParams, SALT_SIZE};

use crate::manifest::MANIFEST_FILE;
use crate::names::{MASTER_BLOB_NAME, MASTER_SALT_FILE};

/// Encrypt `manifest_bytes` under the master password and persist both the
/// wrapped blob and the hex salt file into `dir`. Returns the fresh salt.
pub fn wrap_manifest(
    manifest_bytes: &[u8],
    master_password: &SecretString,
    dir: &Path,
) -> VaultResult<[u8; SALT_SIZE]> {
    let salt = generate_salt();
    let key = derive_key(master_password, &salt, &KdfParams::default())?;

    let blob = chunk::encode(manifest_bytes, &key, 0, Some(MANIFEST_FILE))?;
    fs::write(dir.join(MASTER_BLOB_NAME), &blob)?;
    fs::write(dir.join(MASTER_SALT_FILE), hex::encode(salt))?;

    Ok(salt)
}

/// Read the salt and wrapped blob from `dir` and recover the manifest
/// bytes. An `Authentication` failure here (wrong master password or
/// tampered blob) is terminal for the whole recovery: there is no fallback
/// manifest source.
pub fn unwrap_manifest(dir: &Path, master_password: &SecretString) -> VaultResult<Vec<u8>> {
    let salt_hex = fs::read_to_string(dir.join(MASTER_SALT_FILE))?;
    let salt = parse_salt(salt_hex.trim())?;
    let key = derive_key(master_password, &salt, &KdfParams::default())?;

    let blob = fs::read(dir.join(MASTER_BLOB_NAME))?;
    let (manifest_bytes, _aad) = chunk::decode(&blob, &key)?;
    Ok(manifest_bytes)
}

fn parse_salt(salt_hex: &str) -> VaultResult<[u8; SALT_SIZE]> {
    let bytes = hex::decode(salt_hex)
        .map_err(|e| VaultError::KeyDerivation(format!("master salt is not valid hex: {e}")))?;
    <[u8; SALT_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
        VaultError::KeyDerivation(format!(
            "master salt must be {SALT_SIZE} bytes, got {}",
            bytes.len()
        ))
    })
}
