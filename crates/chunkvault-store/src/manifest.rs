//! Manifest records: building, durable appending, parsing, grouping
//!
//! The manifest is a newline-delimited stream of tagged JSON records,
//! append-only while a run is in progress and immutable once master-wrapped.
//! Two record kinds exist:
//!
//! - `begin` — appended before a file's first chunk blob is written. It
//!   persists the per-file salt and password up front, so an interrupted
//!   run can be reconciled and empty files can be reconstructed.
//! - `chunk` — one per chunk. It repeats the file's identifying fields, so
//!   a manifest whose begin record was lost still reconstructs fully.
//!
//! Records are versioned and validated strictly: unknown or missing fields
//! reject that line deterministically. A rejected line is skipped with a
//! warning; it never aborts the rest of the manifest.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use chunkvault_core::{VaultError, VaultResult};
use chunkvault_crypto::SALT_SIZE;

/// Current manifest record version.
pub const MANIFEST_VERSION: u32 = 1;

/// Name of the plaintext manifest while a run is in progress. Removed after
/// master wrapping; it must never remain on disk once the run completes.
pub const MANIFEST_FILE: &str = "dirinfo.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeginRecord {
    pub v: u32,
    pub name: String,
    /// Original-root-relative directory segments
    pub path: Vec<String>,
    /// Output directory the blobs were written to
    pub chunkpath: String,
    /// Hex-encoded per-file KDF salt
    pub base_salt: String,
    /// Per-file password, cleartext by design (see crate docs)
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkRecord {
    pub v: u32,
    pub name: String,
    pub path: Vec<String>,
    pub chunkpath: String,
    pub base_salt: String,
    pub password: String,
    pub chunk_id: u64,
    /// Blob file name (resolved against the source directory on decrypt)
    pub chunk_name: String,
}

/// One manifest line, externally tagged: `{"begin":{..}}` or `{"chunk":{..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestRecord {
    Begin(BeginRecord),
    Chunk(ChunkRecord),
}

/// The per-file metadata the engine threads through one file's encryption.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub name: String,
    pub path: Vec<String>,
    pub chunkpath: String,
    pub base_salt: [u8; SALT_SIZE],
    pub password: String,
}

impl FileMeta {
    pub fn begin_record(&self) -> ManifestRecord {
        ManifestRecord::Begin(BeginRecord {
            v: MANIFEST_VERSION,
            name: self.name.clone(),
            path: self.path.clone(),
            chunkpath: self.chunkpath.clone(),
            base_salt: hex::encode(self.base_salt),
            password: self.password.clone(),
        })
    }

    pub fn chunk_record(&self, chunk_id: u64, chunk_name: &str) -> ManifestRecord {
        ManifestRecord::Chunk(ChunkRecord {
            v: MANIFEST_VERSION,
            name: self.name.clone(),
            path: self.path.clone(),
            chunkpath: self.chunkpath.clone(),
            base_salt: hex::encode(self.base_salt),
            password: self.password.clone(),
            chunk_id,
            chunk_name: chunk_name.to_string(),
        })
    }
}

/// Append-only manifest writer.
///
/// Every append is flushed and fsynced before returning, so a crash leaves
/// a valid prefix of complete records and loses at most the in-progress
/// chunk. Lines are never rewritten.
pub struct ManifestWriter {
    file: File,
    path: PathBuf,
}

impl ManifestWriter {
    /// Open (or create) the manifest in `dir` for appending.
    pub fn open(dir: &Path) -> VaultResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { file, path })
    }

    pub fn append(&mut self, record: &ManifestRecord) -> VaultResult<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| VaultError::Other(anyhow::anyhow!("manifest serialization: {e}")))?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reference to one chunk blob, as recovered from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRef {
    pub chunk_id: u64,
    pub chunk_name: String,
}

/// One original file: its key material and ordered chunk list.
#[derive(Debug, Clone)]
pub struct FileGroup {
    pub name: String,
    pub path: Vec<String>,
    pub base_salt: [u8; SALT_SIZE],
    pub password: String,
    pub chunks: Vec<ChunkRef>,
}

/// Parse result: file groups plus the per-line errors that were skipped.
#[derive(Debug)]
pub struct ParsedManifest {
    pub files: Vec<FileGroup>,
    pub rejects: Vec<VaultError>,
}

/// Parse a full manifest, grouping records by `(path, name)` and sorting
/// each group's chunks by `chunk_id` ascending regardless of line order.
///
/// Per-line failures (bad JSON, unknown fields, wrong version, bad salt)
/// are skipped with a warning. A `begin` record supersedes any earlier
/// state for its file: after a crashed run is re-run, the newest record
/// sequence wins and stale chunk records (salt mismatch) are dropped.
pub fn parse_manifest(content: &str) -> ParsedManifest {
    let mut groups: BTreeMap<(Vec<String>, String), FileGroup> = BTreeMap::new();
    let mut rejects = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(reason) = apply_line(line, &mut groups) {
            warn!(line = line_no, %reason, "skipping manifest record");
            rejects.push(VaultError::ManifestRecord {
                line: line_no,
                reason,
            });
        }
    }

    let mut files: Vec<FileGroup> = groups.into_values().collect();
    for group in &mut files {
        group.chunks.sort_by_key(|c| c.chunk_id);
        group.chunks.dedup_by_key(|c| c.chunk_id);
    }

    ParsedManifest { files, rejects }
}

fn apply_line(
    line: &str,
    groups: &mut BTreeMap<(Vec<String>, String), FileGroup>,
) -> Result<(), String> {
    let record: ManifestRecord = serde_json::from_str(line).map_err(|e| e.to_string())?;

    match record {
        ManifestRecord::Begin(r) => {
            if r.v != MANIFEST_VERSION {
                return Err(format!("unsupported record version {}", r.v));
            }
            let base_salt = decode_salt(&r.base_salt)?;
            let key = (r.path.clone(), r.name.clone());
            if groups.contains_key(&key) {
                debug!(name = %r.name, "begin record supersedes earlier records for this file");
            }
            groups.insert(
                key,
                FileGroup {
                    name: r.name,
                    path: r.path,
                    base_salt,
                    password: r.password,
                    chunks: Vec::new(),
                },
            );
            Ok(())
        }
        ManifestRecord::Chunk(r) => {
            if r.v != MANIFEST_VERSION {
                return Err(format!("unsupported record version {}", r.v));
            }
            let base_salt = decode_salt(&r.base_salt)?;
            let key = (r.path.clone(), r.name.clone());
            match groups.get_mut(&key) {
                Some(group) => {
                    if group.base_salt != base_salt {
                        return Err("salt differs from the file's current record sequence (stale chunk record)".into());
                    }
                    group.chunks.push(ChunkRef {
                        chunk_id: r.chunk_id,
                        chunk_name: r.chunk_name,
                    });
                }
                None => {
                    // No begin record seen (older manifest, or lost line):
                    // chunk records carry the full field set for exactly
                    // this case.
                    groups.insert(
                        key,
                        FileGroup {
                            name: r.name,
                            path: r.path,
                            base_salt,
                            password: r.password,
                            chunks: vec![ChunkRef {
                                chunk_id: r.chunk_id,
                                chunk_name: r.chunk_name,
                            }],
                        },
                    );
                }
            }
            Ok(())
        }
    }
}

fn decode_salt(salt_hex: &str) -> Result<[u8; SALT_SIZE], String> {
    let bytes = hex::decode(salt_hex).map_err(|e| format!("base_salt is not valid hex: {e}"))?;
    <[u8; SALT_SIZE]>::try_from(bytes.as_slice())
        .map_err(|_| format!("base_salt must be {SALT_SIZE} bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, path: &[&str]) -> FileMeta {
        FileMeta {
            name: name.to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
            chunkpath: "/tmp/out".to_string(),
            base_salt: [7u8; SALT_SIZE],
            password: "pw".to_string(),
        }
    }

    fn render(records: &[ManifestRecord]) -> String {
        records
            .iter()
            .map(|r| serde_json::to_string(r).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_grouping_and_sorting() {
        let a = meta("a.txt", &["docs"]);
        let b = meta("b.txt", &[]);

        // Deliberately shuffled line order.
        let content = render(&[
            a.chunk_record(2, "blob_a2.enc"),
            b.begin_record(),
            a.begin_record(),
            b.chunk_record(0, "blob_b0.enc"),
            a.chunk_record(0, "blob_a0.enc"),
            a.chunk_record(1, "blob_a1.enc"),
        ]);

        let parsed = parse_manifest(&content);
        assert!(parsed.rejects.is_empty());
        assert_eq!(parsed.files.len(), 2);

        let group_a = parsed
            .files
            .iter()
            .find(|g| g.name == "a.txt")
            .unwrap();
        let ids: Vec<u64> = group_a.chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(group_a.chunks[1].chunk_name, "blob_a1.enc");

        let group_b = parsed
            .files
            .iter()
            .find(|g| g.name == "b.txt")
            .unwrap();
        assert_eq!(group_b.chunks.len(), 1);
    }

    #[test]
    fn test_begin_only_group_is_empty_file() {
        let content = render(&[meta("empty.bin", &["x"]).begin_record()]);

        let parsed = parse_manifest(&content);
        assert_eq!(parsed.files.len(), 1);
        assert!(parsed.files[0].chunks.is_empty());
        assert_eq!(parsed.files[0].password, "pw");
    }

    #[test]
    fn test_chunk_records_alone_reconstruct() {
        let a = meta("solo.txt", &[]);
        let content = render(&[
            a.chunk_record(1, "c1.enc"),
            a.chunk_record(0, "c0.enc"),
        ]);

        let parsed = parse_manifest(&content);
        assert_eq!(parsed.files.len(), 1);
        let ids: Vec<u64> = parsed.files[0].chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(parsed.files[0].base_salt, [7u8; SALT_SIZE]);
    }

    #[test]
    fn test_invalid_lines_skipped() {
        let a = meta("keep.txt", &[]);
        let content = format!(
            "not json at all\n{}\n{{\"chunk\":{{\"v\":1}}}}\n",
            serde_json::to_string(&a.begin_record()).unwrap()
        );

        let parsed = parse_manifest(&content);
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.rejects.len(), 2);
        assert!(matches!(
            parsed.rejects[0],
            VaultError::ManifestRecord { line: 1, .. }
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut value: serde_json::Value =
            serde_json::to_value(meta("f", &[]).begin_record()).unwrap();
        value["begin"]["extra"] = serde_json::json!("surprise");
        let content = value.to_string();

        let parsed = parse_manifest(&content);
        assert!(parsed.files.is_empty());
        assert_eq!(parsed.rejects.len(), 1);
    }

    #[test]
    fn test_wrong_version_rejected() {
        let ManifestRecord::Begin(mut r) = meta("f", &[]).begin_record() else {
            unreachable!()
        };
        r.v = 99;
        let content = serde_json::to_string(&ManifestRecord::Begin(r)).unwrap();

        let parsed = parse_manifest(&content);
        assert!(parsed.files.is_empty());
        assert_eq!(parsed.rejects.len(), 1);
    }

    #[test]
    fn test_bad_salt_rejected() {
        let ManifestRecord::Begin(mut r) = meta("f", &[]).begin_record() else {
            unreachable!()
        };
        r.base_salt = "zz".to_string();
        let content = serde_json::to_string(&ManifestRecord::Begin(r)).unwrap();

        let parsed = parse_manifest(&content);
        assert!(parsed.files.is_empty());
        assert_eq!(parsed.rejects.len(), 1);
    }

    #[test]
    fn test_rerun_begin_supersedes_stale_chunks() {
        let old = meta("f.txt", &[]);
        let mut new = meta("f.txt", &[]);
        new.base_salt = [8u8; SALT_SIZE];
        new.password = "pw2".to_string();

        let content = render(&[
            old.begin_record(),
            old.chunk_record(0, "old0.enc"),
            // Crash, re-run: a fresh begin record for the same file.
            new.begin_record(),
            new.chunk_record(0, "new0.enc"),
            // A straggler from the old sequence must not mix in.
            old.chunk_record(1, "old1.enc"),
        ]);

        let parsed = parse_manifest(&content);
        assert_eq!(parsed.files.len(), 1);
        let group = &parsed.files[0];
        assert_eq!(group.base_salt, [8u8; SALT_SIZE]);
        assert_eq!(group.password, "pw2");
        assert_eq!(group.chunks.len(), 1);
        assert_eq!(group.chunks[0].chunk_name, "new0.enc");
        assert_eq!(parsed.rejects.len(), 1, "stale chunk record is rejected");
    }

    #[test]
    fn test_writer_appends_durable_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = meta("a.txt", &[]);

        let mut writer = ManifestWriter::open(dir.path()).unwrap();
        writer.append(&a.begin_record()).unwrap();
        writer.append(&a.chunk_record(0, "c0.enc")).unwrap();
        drop(writer);

        let content = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        assert_eq!(content.lines().count(), 2);

        let parsed = parse_manifest(&content);
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].chunks.len(), 1);
    }
}
