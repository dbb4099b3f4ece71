//! chunkvault-crypto: chunk-level authenticated encryption
//!
//! Pipeline: plaintext window → AES-256-GCM encrypt → framed chunk bytes
//!
//! Key discipline:
//! ```text
//! per-file password (random, 120 chars)
//!   └── file key (256-bit, scrypt from password + per-file salt)
//!         └── chunk AEAD: AES-256-GCM
//!             (nonce = random 128-bit, AAD = chunk_index + path hint)
//! master password (operator-supplied)
//!   └── master key (scrypt from password + master salt)
//!         └── wraps the manifest as a single chunk
//! ```
//!
//! Only salts are ever persisted; keys are re-derived on demand.

pub mod chunk;
pub mod kdf;
pub mod passgen;

pub use chunk::{decode, encode, declared_index};
pub use kdf::{derive_key, generate_salt, DerivedKey, KdfParams};
pub use passgen::generate_password;

/// Size of a derived symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a KDF salt in bytes
pub const SALT_SIZE: usize = 16;

/// Size of an AES-GCM nonce as used by the chunk format (128-bit)
pub const NONCE_SIZE: usize = 16;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the big-endian AAD length field in the chunk framing
pub const AAD_LEN_SIZE: usize = 4;
