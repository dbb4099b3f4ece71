use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// The KDF rejected its parameters or inputs. Fatal for the whole run.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Chunk bytes are structurally invalid (truncated, impossible AAD
    /// length, missing chunks). Fatal for the affected file only.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    /// AEAD tag verification failed: wrong key or tampered data. Fatal for
    /// the affected file; terminal for the run when it is the master wrap.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A manifest line did not parse or validate. Non-fatal: the line is
    /// skipped with a warning.
    #[error("manifest record (line {line}): {reason}")]
    ManifestRecord { line: usize, reason: String },

    /// The index embedded in a chunk's AAD disagrees with the manifest's
    /// chunk_id. Only raised when strict AAD checking is enabled; the
    /// manifest order is authoritative otherwise.
    #[error("AAD index mismatch: manifest says {expected}, chunk says {declared:?}")]
    AadMismatch { expected: u64, declared: Option<u64> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
