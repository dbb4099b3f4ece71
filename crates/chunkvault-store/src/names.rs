//! Opaque blob naming
//!
//! Chunk blobs are stored under double-hashed names so the output directory
//! leaks neither file names, nor chunk ordering, nor which blobs belong to
//! the same file. The mapping back to `(file, chunk_id)` exists only inside
//! the (master-wrapped) manifest.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Well-known name of the master-wrapped manifest blob. Fixed so decryption
/// can locate it without consulting the still-encrypted manifest.
pub const MASTER_BLOB_NAME: &str = "masterkey.enc";

/// Well-known name of the cleartext hex master salt file.
pub const MASTER_SALT_FILE: &str = "master_salt.txt";

/// Suffix shared by every chunk blob.
pub const BLOB_SUFFIX: &str = ".enc";

/// Per-file blob name generator.
///
/// Holds the random token drawn for one file; the token never leaves this
/// value and is not persisted anywhere.
#[derive(Debug, Clone)]
pub struct BlobNamer {
    base: String,
}

impl BlobNamer {
    /// Create a namer for one file with a fresh random 16-byte token.
    pub fn new(file_name: &str) -> Self {
        let mut token = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut token);
        Self::from_token(&token, file_name)
    }

    /// Deterministic construction from a known token.
    pub fn from_token(token: &[u8; 16], file_name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token);
        hasher.update(file_name.as_bytes());
        hasher.update(token);
        Self {
            base: hex::encode(hasher.finalize()),
        }
    }

    /// Blob name for one chunk: the per-file base scoped by index, hashed
    /// again so sibling chunks share no visible prefix.
    pub fn blob_name(&self, chunk_index: u64) -> String {
        let scoped = format!("{}_{:05}", self.base, chunk_index);
        let digest = Sha256::digest(scoped.as_bytes());
        format!("{}{}", hex::encode(digest), BLOB_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_from_token() {
        let token = [9u8; 16];
        let a = BlobNamer::from_token(&token, "report.pdf");
        let b = BlobNamer::from_token(&token, "report.pdf");

        assert_eq!(a.blob_name(0), b.blob_name(0));
        assert_eq!(a.blob_name(42), b.blob_name(42));
    }

    #[test]
    fn test_fresh_token_per_namer() {
        let a = BlobNamer::new("report.pdf");
        let b = BlobNamer::new("report.pdf");

        assert_ne!(
            a.blob_name(0),
            b.blob_name(0),
            "same file name must not produce the same blob names across files"
        );
    }

    #[test]
    fn test_indices_do_not_share_prefix() {
        let namer = BlobNamer::from_token(&[1u8; 16], "data.bin");
        let n0 = namer.blob_name(0);
        let n1 = namer.blob_name(1);

        assert_ne!(n0, n1);
        assert_ne!(n0[..8], n1[..8], "names must not reveal ordering");
    }

    #[test]
    fn test_name_shape() {
        let name = BlobNamer::from_token(&[0u8; 16], "x").blob_name(0);

        assert!(name.ends_with(BLOB_SUFFIX));
        let stem = name.trim_end_matches(BLOB_SUFFIX);
        assert_eq!(stem.len(), 64);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
