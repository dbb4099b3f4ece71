use serde::{Deserialize, Serialize};

/// Top-level configuration (loaded from cvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub chunking: ChunkingConfig,
    pub security: SecurityConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Plaintext bytes per chunk (default: 50 MiB)
    pub chunk_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Fail a file's reconstruction when a chunk's embedded AAD index
    /// disagrees with the manifest chunk_id (default: warn only — the
    /// manifest order is authoritative)
    pub strict_aad_check: bool,
    /// Length of generated per-file passwords (default: 120)
    pub file_password_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Report orphaned chunk blobs during reconcile instead of deleting them
    pub keep_orphans: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 50 * 1024 * 1024,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            strict_aad_check: false,
            file_password_length: 120,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            keep_orphans: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[chunking]
chunk_size_bytes = 1024

[security]
strict_aad_check = true
file_password_length = 64

[output]
keep_orphans = true
"#;
        let config: VaultConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.chunking.chunk_size_bytes, 1024);
        assert!(config.security.strict_aad_check);
        assert_eq!(config.security.file_password_length, 64);
        assert!(config.output.keep_orphans);
    }

    #[test]
    fn test_parse_defaults() {
        let config: VaultConfig = toml::from_str("").unwrap();

        assert_eq!(config.chunking.chunk_size_bytes, 50 * 1024 * 1024);
        assert!(!config.security.strict_aad_check);
        assert_eq!(config.security.file_password_length, 120);
        assert!(!config.output.keep_orphans);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[chunking]
chunk_size_bytes = 4096
"#;
        let config: VaultConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.chunking.chunk_size_bytes, 4096);
        // Defaults
        assert!(!config.security.strict_aad_check);
        assert_eq!(config.security.file_password_length, 120);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = VaultConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: VaultConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(
            config.chunking.chunk_size_bytes,
            parsed.chunking.chunk_size_bytes
        );
        assert_eq!(
            config.security.strict_aad_check,
            parsed.security.strict_aad_check
        );
        assert_eq!(config.output.keep_orphans, parsed.output.keep_orphans);
    }
}
