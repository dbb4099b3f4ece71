//! Encrypt/decrypt pipeline: walks trees, drives the chunk store, and owns
//! the per-file error boundary
//!
//! Processing is file-by-file and fully sequential: nonce freshness,
//! manifest append ordering, and crash consistency are all easiest to
//! reason about without interleaving. A failure in one file is logged and
//! reported; it never aborts the encryption or restoration of its siblings.
//! Only key-derivation failures (bad build-time parameters) and master-wrap
//! failures abort a whole run.

use std::collections::HashSet;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use tracing::{info, warn};

use chunkvault_core::config::VaultConfig;
use chunkvault_core::{VaultError, VaultResult};
use chunkvault_crypto::{derive_key, generate_password, generate_salt, KdfParams};

use crate::manifest::{parse_manifest, FileGroup, FileMeta, ManifestWriter};
use crate::master::{unwrap_manifest, wrap_manifest};
use crate::names::{BlobNamer, BLOB_SUFFIX, MASTER_BLOB_NAME};
use crate::store::{decrypt_and_concatenate, split_and_encrypt};
use crate::walk::FileWalker;

/// Progress callback type (items_done, items_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

#[derive(Debug, Default)]
pub struct EncryptOutcome {
    pub files_encrypted: usize,
    pub files_failed: usize,
    pub chunks_written: u64,
    pub bytes_read: u64,
}

#[derive(Debug, Default)]
pub struct DecryptOutcome {
    pub files_restored: usize,
    pub files_failed: usize,
    pub bytes_written: u64,
    /// Manifest lines that were rejected and skipped during parsing
    pub records_skipped: usize,
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Blobs present and referenced by the manifest
    pub referenced: usize,
    /// Blob names with no manifest record
    pub orphans: Vec<String>,
    /// How many orphans were deleted (0 when `keep_orphans` is set)
    pub removed: usize,
}

/// Encrypt every regular file under `input_root` into `out_dir`, then
/// master-wrap the manifest and remove its plaintext.
///
/// On success the output directory holds only opaque chunk blobs,
/// `masterkey.enc`, and `master_salt.txt` — the salt file and the master
/// password together are what recovery needs.
pub fn encrypt_tree(
    input_root: &Path,
    out_dir: &Path,
    master_password: &SecretString,
    config: &VaultConfig,
    progress: Option<&ProgressFn>,
) -> VaultResult<EncryptOutcome> {
    fs::create_dir_all(out_dir)?;

    let files: Vec<PathBuf> = FileWalker::single(input_root).collect();
    let total = files.len() as u64;
    let chunkpath = out_dir.to_string_lossy().into_owned();

    let mut writer = ManifestWriter::open(out_dir)?;
    let mut outcome = EncryptOutcome::default();

    for (i, file) in files.iter().enumerate() {
        if let Some(cb) = progress {
            cb(i as u64, total, &file.display().to_string());
        }

        match encrypt_one(file, input_root, &chunkpath, out_dir, config, &mut writer) {
            Ok((chunks, bytes)) => {
                info!(path = %file.display(), chunks, bytes, "encrypted");
                outcome.files_encrypted += 1;
                outcome.chunks_written += chunks;
                outcome.bytes_read += bytes;
            }
            Err(e @ VaultError::KeyDerivation(_)) => return Err(e),
            Err(e) => {
                warn!(path = %file.display(), error = %e, "file encryption failed");
                outcome.files_failed += 1;
            }
        }
    }

    if let Some(cb) = progress {
        cb(total, total, "wrapping manifest");
    }

    let manifest_path = writer.path().to_path_buf();
    drop(writer);

    let manifest_bytes = fs::read(&manifest_path)?;
    wrap_manifest(&manifest_bytes, master_password, out_dir)?;
    // The plaintext manifest must not outlive the wrap.
    fs::remove_file(&manifest_path)?;

    info!(
        files = outcome.files_encrypted,
        failed = outcome.files_failed,
        chunks = outcome.chunks_written,
        "encryption run complete"
    );
    Ok(outcome)
}

fn encrypt_one(
    file: &Path,
    input_root: &Path,
    chunkpath: &str,
    out_dir: &Path,
    config: &VaultConfig,
    writer: &mut ManifestWriter,
) -> VaultResult<(u64, u64)> {
    let (name, segments, hint) = relative_meta(input_root, file)?;

    let password = generate_password(config.security.file_password_length);
    let base_salt = generate_salt();
    let key = derive_key(
        &SecretString::from(password.clone()),
        &base_salt,
        &KdfParams::default(),
    )?;

    let meta = FileMeta {
        name: name.clone(),
        path: segments,
        chunkpath: chunkpath.to_string(),
        base_salt,
        password,
    };

    // Salt and password hit the manifest before the first blob exists, so
    // an interrupted file can be reconciled or resumed.
    writer.append(&meta.begin_record())?;

    let namer = BlobNamer::new(&name);
    let reader = BufReader::new(fs::File::open(file)?);

    let stored = split_and_encrypt(
        reader,
        &key,
        config.chunking.chunk_size_bytes,
        Some(&hint),
        &namer,
        out_dir,
        |chunk_id, blob_name| writer.append(&meta.chunk_record(chunk_id, blob_name)),
    )?;

    let bytes: u64 = stored.iter().map(|c| c.plaintext_len as u64).sum();
    Ok((stored.len() as u64, bytes))
}

/// Recover the manifest from `source_dir` and rebuild the original tree
/// under `target_root`.
///
/// A wrong master password or a tampered master blob terminates the whole
/// run. Per-file failures (missing or corrupted chunks) skip that file;
/// nothing partial is written for it.
pub fn decrypt_tree(
    source_dir: &Path,
    target_root: &Path,
    master_password: &SecretString,
    config: &VaultConfig,
    progress: Option<&ProgressFn>,
) -> VaultResult<DecryptOutcome> {
    let manifest_bytes = unwrap_manifest(source_dir, master_password)?;
    let content = String::from_utf8(manifest_bytes)
        .map_err(|e| VaultError::Other(anyhow::anyhow!("manifest is not valid UTF-8: {e}")))?;

    let parsed = parse_manifest(&content);
    let total = parsed.files.len() as u64;

    let mut outcome = DecryptOutcome {
        records_skipped: parsed.rejects.len(),
        ..DecryptOutcome::default()
    };

    for (i, group) in parsed.files.iter().enumerate() {
        if let Some(cb) = progress {
            cb(i as u64, total, &group.name);
        }

        match restore_one(source_dir, target_root, group, config) {
            Ok(bytes) => {
                info!(name = %group.name, bytes, "restored");
                outcome.files_restored += 1;
                outcome.bytes_written += bytes;
            }
            Err(e @ VaultError::KeyDerivation(_)) => return Err(e),
            Err(e) => {
                warn!(name = %group.name, error = %e, "file restoration failed");
                outcome.files_failed += 1;
            }
        }
    }

    if let Some(cb) = progress {
        cb(total, total, "done");
    }

    info!(
        files = outcome.files_restored,
        failed = outcome.files_failed,
        skipped_records = outcome.records_skipped,
        "decryption run complete"
    );
    Ok(outcome)
}

fn restore_one(
    source_dir: &Path,
    target_root: &Path,
    group: &FileGroup,
    config: &VaultConfig,
) -> VaultResult<u64> {
    let target = safe_target_path(target_root, &group.path, &group.name)?;

    let password = SecretString::from(group.password.clone());
    let key = derive_key(&password, &group.base_salt, &KdfParams::default())?;

    let data = decrypt_and_concatenate(
        source_dir,
        &group.chunks,
        &key,
        config.security.strict_aad_check,
    )?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    // Write via a sibling temp file so a failure never leaves a truncated
    // target behind.
    let tmp = target.with_extension("cvault_tmp");
    fs::write(&tmp, &data)?;
    fs::rename(&tmp, &target)?;

    Ok(data.len() as u64)
}

/// Delete (or report, with `output.keep_orphans`) every `*.enc` blob in
/// `dir` that no manifest record references.
///
/// This is the recovery procedure for runs interrupted mid-file: their
/// partially-written blobs have no complete record sequence and are
/// reclaimed here. The master blob itself is always kept.
pub fn reconcile(
    dir: &Path,
    master_password: &SecretString,
    config: &VaultConfig,
) -> VaultResult<ReconcileOutcome> {
    let manifest_bytes = unwrap_manifest(dir, master_password)?;
    let content = String::from_utf8(manifest_bytes)
        .map_err(|e| VaultError::Other(anyhow::anyhow!("manifest is not valid UTF-8: {e}")))?;
    let parsed = parse_manifest(&content);

    let mut referenced: HashSet<String> = HashSet::new();
    for group in &parsed.files {
        for chunk in &group.chunks {
            referenced.insert(chunk.chunk_name.clone());
        }
    }
    referenced.insert(MASTER_BLOB_NAME.to_string());

    let mut outcome = ReconcileOutcome::default();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.ends_with(BLOB_SUFFIX) {
            continue;
        }
        if referenced.contains(&file_name) {
            outcome.referenced += 1;
        } else {
            warn!(blob = %file_name, "orphaned blob (no manifest record)");
            if !config.output.keep_orphans {
                fs::remove_file(entry.path())?;
                outcome.removed += 1;
            }
            outcome.orphans.push(file_name);
        }
    }
    outcome.orphans.sort();

    Ok(outcome)
}

/// Derive `(file_name, directory segments, AAD path hint)` for one file,
/// relative to the walked root. The hint matches the manifest `path` — the
/// AAD is stored in the clear, so absolute source paths stay out of it.
fn relative_meta(input_root: &Path, file: &Path) -> VaultResult<(String, Vec<String>, String)> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| VaultError::Other(anyhow::anyhow!("file has no name: {}", file.display())))?;

    let rel = file
        .strip_prefix(input_root)
        .ok()
        .filter(|r| !r.as_os_str().is_empty());

    let segments: Vec<String> = match rel {
        Some(rel) => rel
            .parent()
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default(),
        // The root itself was a single file.
        None => Vec::new(),
    };

    let mut hint_parts = segments.clone();
    hint_parts.push(name.clone());
    let hint = hint_parts.join("/");

    Ok((name, segments, hint))
}

fn safe_target_path(root: &Path, segments: &[String], name: &str) -> VaultResult<PathBuf> {
    let mut target = root.to_path_buf();
    for segment in segments {
        validate_segment(segment)?;
        target.push(segment);
    }
    validate_segment(name)?;
    target.push(name);
    Ok(target)
}

/// The manifest is authenticated, but an authentic manifest from elsewhere
/// must still not be able to write outside the target root.
fn validate_segment(segment: &str) -> VaultResult<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0'])
    {
        return Err(VaultError::Other(anyhow::anyhow!(
            "unsafe path segment in manifest: {segment:?}"
        )));
    }
    Ok(())
}
