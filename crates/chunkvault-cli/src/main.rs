//! cvault: chunked tree encryption CLI
//!
//! Commands:
//!   encrypt <INPUT_ROOT> <OUTPUT_DIR>   - encrypt a file or tree into chunks
//!   decrypt <SOURCE_DIR> <TARGET_ROOT>  - rebuild the original tree
//!   reconcile <DIR>                     - reclaim blobs no manifest record references
//!
//! The master password comes from --master-password, CVAULT_MASTER_PASSWORD,
//! or an interactive prompt. After encryption, the output directory plus the
//! master password are everything recovery needs; master_salt.txt inside it
//! must be kept but is not secret.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use tracing::info;

use chunkvault_core::config::VaultConfig;
use chunkvault_store::engine::{self, ProgressFn};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cvault",
    version,
    about = "Chunked authenticated-encryption vault",
    long_about = "cvault: encrypt a directory tree into independently-authenticated \
                  chunks, with the reassembly manifest wrapped under a master password"
)]
struct Cli {
    /// Path to cvault.toml configuration file
    #[arg(long, short = 'c', env = "CVAULT_CONFIG", default_value = "cvault.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CVAULT_LOG", default_value = "warn")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "CVAULT_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file or directory tree into an output directory
    Encrypt {
        /// File or directory to encrypt
        input: PathBuf,
        /// Directory that receives the chunk blobs and master artifacts
        output: PathBuf,
        /// Master password (prompted for when absent)
        #[arg(long, env = "CVAULT_MASTER_PASSWORD", hide_env_values = true)]
        master_password: Option<String>,
    },

    /// Decrypt an encrypted directory back into the original tree
    Decrypt {
        /// Directory holding the chunk blobs, masterkey.enc, and master_salt.txt
        source: PathBuf,
        /// Directory the original tree is rebuilt under
        target: PathBuf,
        /// Master password (prompted for when absent)
        #[arg(long, env = "CVAULT_MASTER_PASSWORD", hide_env_values = true)]
        master_password: Option<String>,
    },

    /// Remove chunk blobs that no manifest record references
    ///
    /// Cleans up blobs orphaned by a run interrupted mid-file.
    Reconcile {
        /// Encrypted directory to reconcile
        dir: PathBuf,
        /// Master password (prompted for when absent)
        #[arg(long, env = "CVAULT_MASTER_PASSWORD", hide_env_values = true)]
        master_password: Option<String>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, &cli.log_format);

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            master_password,
        } => cmd_encrypt(&config, &input, &output, master_password),
        Commands::Decrypt {
            source,
            target,
            master_password,
        } => cmd_decrypt(&config, &source, &target, master_password),
        Commands::Reconcile {
            dir,
            master_password,
        } => cmd_reconcile(&config, &dir, master_password),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<VaultConfig> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(VaultConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}

// ── Master password resolution ────────────────────────────────────────────────

fn resolve_master_password(provided: Option<String>, confirm: bool) -> Result<SecretString> {
    if let Some(password) = provided {
        return Ok(SecretString::from(password));
    }

    let password =
        rpassword::prompt_password("Master password: ").context("reading master password")?;
    if password.is_empty() {
        anyhow::bail!("master password must not be empty");
    }
    if confirm {
        let again = rpassword::prompt_password("Master password (again): ")
            .context("reading master password confirmation")?;
        if password != again {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(password))
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_callback(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |done, total, msg| {
        pb.set_length(total);
        pb.set_position(done);
        pb.set_message(msg.to_string());
    })
}

// ── `cvault encrypt` ──────────────────────────────────────────────────────────

fn cmd_encrypt(
    config: &VaultConfig,
    input: &Path,
    output: &Path,
    master_password: Option<String>,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("input not found: {}", input.display());
    }
    let password = resolve_master_password(master_password, true)?;

    println!("Encrypting {} → {}", input.display(), output.display());

    let pb = make_progress_bar("encrypt");
    let progress = progress_callback(&pb);

    let outcome = engine::encrypt_tree(input, output, &password, config, Some(&progress))
        .with_context(|| format!("encrypting {}", input.display()))?;

    pb.finish_with_message("done".to_string());
    info!(files = outcome.files_encrypted, "encrypt finished");

    println!();
    println!("Encryption complete:");
    println!("  files:   {}", outcome.files_encrypted);
    if outcome.files_failed > 0 {
        println!("  failed:  {} (see warnings above)", outcome.files_failed);
    }
    println!("  chunks:  {}", outcome.chunks_written);
    println!("  bytes:   {}", fmt_bytes(outcome.bytes_read));
    println!();
    println!(
        "Keep {} together with the blobs — it is required for recovery.",
        output.join(chunkvault_store::MASTER_SALT_FILE).display()
    );
    println!("The master password is the only secret; store it safely.");

    Ok(())
}

// ── `cvault decrypt` ──────────────────────────────────────────────────────────

fn cmd_decrypt(
    config: &VaultConfig,
    source: &Path,
    target: &Path,
    master_password: Option<String>,
) -> Result<()> {
    if !source.join(chunkvault_store::MASTER_BLOB_NAME).exists() {
        anyhow::bail!(
            "{} not found in {} — is this an encrypted directory?",
            chunkvault_store::MASTER_BLOB_NAME,
            source.display()
        );
    }
    let password = resolve_master_password(master_password, false)?;

    println!("Decrypting {} → {}", source.display(), target.display());

    let pb = make_progress_bar("decrypt");
    let progress = progress_callback(&pb);

    let outcome = engine::decrypt_tree(source, target, &password, config, Some(&progress))
        .with_context(|| format!("decrypting {}", source.display()))?;

    pb.finish_with_message("done".to_string());

    println!();
    println!("Decryption complete:");
    println!("  files:   {}", outcome.files_restored);
    if outcome.files_failed > 0 {
        println!("  failed:  {} (see warnings above)", outcome.files_failed);
    }
    if outcome.records_skipped > 0 {
        println!("  skipped: {} manifest records", outcome.records_skipped);
    }
    println!("  bytes:   {}", fmt_bytes(outcome.bytes_written));

    Ok(())
}

// ── `cvault reconcile` ────────────────────────────────────────────────────────

fn cmd_reconcile(config: &VaultConfig, dir: &Path, master_password: Option<String>) -> Result<()> {
    let password = resolve_master_password(master_password, false)?;

    let outcome = engine::reconcile(dir, &password, config)
        .with_context(|| format!("reconciling {}", dir.display()))?;

    println!("Reconcile complete:");
    println!("  referenced blobs: {}", outcome.referenced);
    println!("  orphaned blobs:   {}", outcome.orphans.len());
    if config.output.keep_orphans {
        for orphan in &outcome.orphans {
            println!("    {orphan}");
        }
        println!("  (kept on disk: output.keep_orphans is set)");
    } else {
        println!("  removed:          {}", outcome.removed);
    }

    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
