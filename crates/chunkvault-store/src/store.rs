//! Chunk store: split/encrypt a byte stream into blobs, and the inverse
//!
//! Splitting is sequential and fixed-size: the final window may be shorter,
//! and an empty input produces zero chunks. Indices start at 0 with no
//! gaps; `chunk_id` strictly reflects byte-offset order.

use std::fs;
use std::io::{ErrorKind, Read};
use std::path::Path;

use tracing::warn;

use chunkvault_core::{VaultError, VaultResult};
use chunkvault_crypto::{chunk, DerivedKey};

use crate::manifest::ChunkRef;
use crate::names::BlobNamer;

/// One chunk as written by `split_and_encrypt`.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk_id: u64,
    pub blob_name: String,
    pub plaintext_len: usize,
}

/// Split `reader` into fixed-size windows, encrypt each independently, and
/// persist the encoded blobs into `out_dir` under the namer's opaque names.
///
/// `on_chunk` runs after each blob is written and before the next window is
/// read; the caller appends the chunk's manifest record there, which keeps
/// the manifest durable ahead of further progress.
pub fn split_and_encrypt<R, F>(
    mut reader: R,
    key: &DerivedKey,
    chunk_size: u64,
    path_hint: Option<&str>,
    namer: &BlobNamer,
    out_dir: &Path,
    mut on_chunk: F,
) -> VaultResult<Vec<StoredChunk>>
where
    R: Read,
    F: FnMut(u64, &str) -> VaultResult<()>,
{
    if chunk_size == 0 {
        return Err(VaultError::Other(anyhow::anyhow!(
            "chunk size must be non-zero"
        )));
    }
    let window_len = usize::try_from(chunk_size)
        .map_err(|_| VaultError::Other(anyhow::anyhow!("chunk size does not fit in memory")))?;

    let mut window = vec![0u8; window_len];
    let mut chunks = Vec::new();
    let mut index = 0u64;

    loop {
        let filled = read_window(&mut reader, &mut window)?;
        if filled == 0 {
            break;
        }

        let encoded = chunk::encode(&window[..filled], key, index, path_hint)?;
        let blob_name = namer.blob_name(index);
        fs::write(out_dir.join(&blob_name), &encoded)?;
        on_chunk(index, &blob_name)?;

        chunks.push(StoredChunk {
            chunk_id: index,
            blob_name,
            plaintext_len: filled,
        });
        index += 1;

        // A short window means the reader hit end-of-stream.
        if filled < window_len {
            break;
        }
    }

    Ok(chunks)
}

/// Fill `buf` from `reader`, short only at end-of-stream.
fn read_window<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Load, decrypt, and concatenate a file's chunks in ascending `chunk_id`
/// order (the slice must already be sorted, as `parse_manifest` produces).
///
/// The whole file is assembled in memory; the first malformed or
/// unauthentic chunk aborts the file, so no partial output can escape.
/// The chunk sequence must be contiguous from 0 — a gap means a lost
/// manifest record and would otherwise truncate the file silently.
pub fn decrypt_and_concatenate(
    dir: &Path,
    chunks: &[ChunkRef],
    key: &DerivedKey,
    strict_aad: bool,
) -> VaultResult<Vec<u8>> {
    let mut out = Vec::new();

    for (pos, chunk_ref) in chunks.iter().enumerate() {
        let expected = pos as u64;
        if chunk_ref.chunk_id != expected {
            return Err(VaultError::MalformedChunk(format!(
                "chunk sequence gap: expected chunk_id {expected}, manifest has {}",
                chunk_ref.chunk_id
            )));
        }
        validate_blob_name(&chunk_ref.chunk_name)?;

        let data = fs::read(dir.join(&chunk_ref.chunk_name))?;
        let (plaintext, aad) = chunk::decode(&data, key)?;

        // The AAD cross-check is advisory by default: AAD alone cannot prove
        // completeness or ordering, so the manifest's chunk_id stays
        // authoritative.
        match chunk::declared_index(&aad) {
            Some(declared) if declared == expected => {}
            declared => {
                if strict_aad {
                    return Err(VaultError::AadMismatch { expected, declared });
                }
                warn!(
                    expected,
                    ?declared,
                    blob = %chunk_ref.chunk_name,
                    "chunk AAD index disagrees with manifest order"
                );
            }
        }

        out.extend_from_slice(&plaintext);
    }

    Ok(out)
}

/// Blob names come from the manifest; refuse anything that could resolve
/// outside the source directory.
fn validate_blob_name(name: &str) -> VaultResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(VaultError::MalformedChunk(format!(
            "unsafe blob name in manifest: {name:?}"
        )));
    }
    Ok(())
}
