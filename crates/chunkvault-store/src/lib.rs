//! chunkvault-store: encrypted chunk storage and tree reassembly
//!
//! Encrypt direction: walk the source tree; for each file derive a key from
//! a fresh random password + salt, split the file into fixed-size chunks,
//! encrypt each chunk independently, and persist it under an opaque blob
//! name. One manifest record per chunk is appended durably as it is written.
//! Finally the whole manifest is itself encrypted ("master-wrapped") under
//! the operator's master password, and the plaintext manifest is removed.
//!
//! Decrypt direction is the inverse: unwrap the manifest, group its records
//! per file, re-derive each file key, and reassemble chunks in `chunk_id`
//! order into the target tree.
//!
//! The per-file password is stored in cleartext *inside* the manifest. This
//! is deliberate: once the manifest is master-wrapped, the master password
//! is the single secret needed to recover everything — there is no separate
//! per-file key escrow to manage or lose.

pub mod engine;
pub mod manifest;
pub mod master;
pub mod names;
pub mod store;
pub mod walk;

pub use engine::{decrypt_tree, encrypt_tree, reconcile, DecryptOutcome, EncryptOutcome, ReconcileOutcome};
pub use manifest::{parse_manifest, ChunkRef, FileGroup, FileMeta, ManifestWriter, ParsedManifest};
pub use master::{unwrap_manifest, wrap_manifest};
pub use names::{BlobNamer, MASTER_BLOB_NAME, MASTER_SALT_FILE};
pub use store::{decrypt_and_concatenate, split_and_encrypt, StoredChunk};
pub use walk::FileWalker;
