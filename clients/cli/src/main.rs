//! QuMail CLI Client
//!
//! Command-line interface for multi-level message encryption.

use clap::{Parser, Subcommand};
use console::{style, Emoji};
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod storage;

use config::CliConfig;
use storage::LocalStorage;

use qumail_core::{
    CallOptions, CancelToken, EncryptRequest, EncryptedEnvelope, Orchestrator, SecurityLevel,
};
use qumail_crypto::kem::PublicKey;

static LOCK: Emoji<'_, '_> = Emoji("🔐 ", "");
static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
static SEND: Emoji<'_, '_> = Emoji("📤 ", "[SEND] ");
static RECV: Emoji<'_, '_> = Emoji("📥 ", "[RECV] ");
static KEY: Emoji<'_, '_> = Emoji("🔑 ", "[KEY] ");

/// QuMail CLI - Quantum-secure multi-level message encryption
#[derive(Parser)]
#[command(name = "qumail")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Act as this identity instead of the configured one
    #[arg(short, long, global = true)]
    identity: Option<String>,

    /// Verbose output (same as --log-level debug)
    #[arg(short, long)]
    verbose: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local key pair and make it the configured identity
    Init {
        /// Identity (email address)
        identity: String,
    },

    /// Show the local public key
    Show {
        /// Print the full public key in hex
        #[arg(long)]
        full: bool,
    },

    /// Publish the local public key to the local directory
    Publish,

    /// Manage the local public key directory
    Contacts {
        #[command(subcommand)]
        action: ContactAction,
    },

    /// Encrypt a message
    Encrypt {
        /// Recipient identity (level 3)
        #[arg(short, long)]
        to: Option<String>,

        /// Security level: 1-4 or quantum-otp, quantum-aes, post-quantum, plaintext
        #[arg(short, long)]
        level: Option<SecurityLevel>,

        /// Message content
        #[arg(short, long)]
        message: Option<String>,

        /// Read message from file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// QKD session id agreed with the recipient (levels 1 and 2)
        #[arg(short, long)]
        session: Option<String>,

        /// Write the envelope here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decrypt an envelope
    Decrypt {
        /// Envelope file
        input: PathBuf,

        /// Write the plaintext here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rotate the local key pair
    Rotate {
        /// Force rotation without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Delete the local key pair
    Delete {
        /// Force deletion without confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ContactAction {
    /// Add a contact's public key
    Add {
        /// Identity
        identity: String,
        /// Public key in hex
        #[arg(long, conflicts_with = "key_file")]
        key: Option<String>,
        /// File holding the public key in hex
        #[arg(long)]
        key_file: Option<PathBuf>,
    },
    /// Remove a contact
    Remove {
        /// Identity
        identity: String,
    },
    /// List contacts
    List,
    /// Write the local public key in hex, for sharing
    Export {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { cli.log_level };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Load config
    let config_path = cli.config.unwrap_or_else(|| {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("qumail");
        path.push("config.toml");
        path
    });

    let mut config = CliConfig::load_or_default(&config_path)?;
    debug!(path = %config_path.display(), "configuration loaded");

    // Initialize storage
    let storage = LocalStorage::open(&config.storage_path)?;
    let identity = cli.identity.or_else(|| config.identity.clone());

    // Execute command
    match cli.command {
        Commands::Init { identity } => {
            init_identity(&storage, &mut config, &config_path, &identity).await?;
        }
        Commands::Show { full } => {
            show_identity(&storage, &require_identity(identity)?, full)?;
        }
        Commands::Publish => {
            publish_identity(&storage, &require_identity(identity)?)?;
        }
        Commands::Contacts { action } => {
            handle_contacts(&storage, identity, action)?;
        }
        Commands::Encrypt {
            to,
            level,
            message,
            file,
            session,
            output,
        } => {
            let request = EncryptRequest {
                level: level.unwrap_or(config.default_level),
                recipient: to,
                session_id: session,
            };
            let identity = require_identity(identity)?;
            encrypt_message(&storage, &config, &identity, request, message, file, output).await?;
        }
        Commands::Decrypt { input, output } => {
            let identity = require_identity(identity)?;
            decrypt_message(&storage, &config, &identity, &input, output).await?;
        }
        Commands::Rotate { force } => {
            rotate_identity(&storage, &require_identity(identity)?, force)?;
        }
        Commands::Delete { force } => {
            delete_identity(&storage, &require_identity(identity)?, force)?;
        }
    }

    Ok(())
}

fn require_identity(identity: Option<String>) -> anyhow::Result<String> {
    identity.ok_or_else(|| anyhow::anyhow!("No identity configured. Run 'qumail init <identity>' first."))
}

/// Surface the failure class alongside the message
fn failure(err: qumail_core::Error) -> anyhow::Error {
    anyhow::anyhow!("{:?}: {}", err.kind(), err)
}

fn build_orchestrator(
    storage: &LocalStorage,
    config: &CliConfig,
    identity: &str,
) -> anyhow::Result<Orchestrator> {
    let orchestrator = Orchestrator::new(
        config.orchestrator.clone(),
        Arc::new(storage.directory()?),
        Arc::new(storage.qkd_endpoint(identity)?),
        Arc::new(storage.key_store()?),
        identity,
    )
    .map_err(failure)?;
    Ok(orchestrator)
}

/// Call options cancelled on Ctrl-C
fn interruptible() -> CallOptions {
    let token = CancelToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });
    CallOptions::new().with_cancel(token)
}

async fn init_identity(
    storage: &LocalStorage,
    config: &mut CliConfig,
    config_path: &Path,
    identity: &str,
) -> anyhow::Result<()> {
    println!("{} Initializing QuMail identity {}...", LOCK, style(identity).cyan());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message("Generating Kyber-512 key pair...");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let orchestrator = build_orchestrator(storage, config, identity)?;
    let public_key = orchestrator.ensure_local_key_pair().await.map_err(failure)?;

    pb.set_message("Publishing public key...");
    storage.directory()?.publish(identity, &public_key).map_err(failure)?;

    config.identity = Some(orchestrator.local_identity().to_string());
    config.save(config_path)?;

    pb.finish_and_clear();

    println!("{} Identity ready!", CHECK);
    println!();
    println!("  {} Identity:    {}", KEY, style(orchestrator.local_identity()).cyan());
    println!("  {} Fingerprint: {}", KEY, style(public_key.fingerprint()).yellow());
    println!();
    println!(
        "{}",
        style("Share your public key with 'qumail contacts export' to receive level 3 messages.").dim()
    );

    Ok(())
}

fn local_public_key(storage: &LocalStorage, identity: &str) -> anyhow::Result<PublicKey> {
    storage
        .key_store()?
        .public_key(identity)
        .map_err(failure)?
        .ok_or_else(|| anyhow::anyhow!("No key pair for {}. Run 'qumail init' first.", identity))
}

fn show_identity(storage: &LocalStorage, identity: &str, full: bool) -> anyhow::Result<()> {
    let public_key = local_public_key(storage, identity)?;

    println!("{} Identity Information", KEY);
    println!();
    println!("  Identity:    {}", style(identity).cyan());
    println!("  Algorithm:   Kyber-512");
    println!("  Fingerprint: {}", style(public_key.fingerprint()).yellow());
    if full {
        println!("  Public key:  {}", public_key.to_hex());
    }

    Ok(())
}

fn publish_identity(storage: &LocalStorage, identity: &str) -> anyhow::Result<()> {
    let public_key = local_public_key(storage, identity)?;
    storage.directory()?.publish(identity, &public_key).map_err(failure)?;
    println!("{} Published {} ({})", CHECK, style(identity).cyan(), public_key.fingerprint());
    Ok(())
}

fn handle_contacts(
    storage: &LocalStorage,
    identity: Option<String>,
    action: ContactAction,
) -> anyhow::Result<()> {
    let directory = storage.directory()?;

    match action {
        ContactAction::Add {
            identity: contact,
            key,
            key_file,
        } => {
            let hex_key = match (key, key_file) {
                (Some(key), _) => key,
                (None, Some(path)) => std::fs::read_to_string(path)?,
                (None, None) => Input::new().with_prompt("Public key (hex)").interact_text()?,
            };
            let public_key = PublicKey::from_hex(hex_key.trim())?;
            directory.publish(&contact, &public_key).map_err(failure)?;
            println!("{} Added contact: {} ({})", CHECK, contact, public_key.fingerprint());
        }
        ContactAction::Remove { identity: contact } => {
            if directory.remove(&contact).map_err(failure)? {
                println!("{} Removed contact: {}", CHECK, contact);
            } else {
                println!("{} No such contact: {}", CROSS, contact);
            }
        }
        ContactAction::List => {
            let contacts = directory.list().map_err(failure)?;
            println!("Contacts:");
            if contacts.is_empty() {
                println!("  (No contacts yet)");
            }
            for (contact, fingerprint) in contacts {
                println!("  {}  {}", style(contact).cyan(), style(fingerprint).dim());
            }
        }
        ContactAction::Export { output } => {
            let identity = require_identity(identity)?;
            let public_key = local_public_key(storage, &identity)?;
            std::fs::write(&output, public_key.to_hex())?;
            println!("{} Public key written to {}", KEY, output.display());
        }
    }

    Ok(())
}

async fn encrypt_message(
    storage: &LocalStorage,
    config: &CliConfig,
    identity: &str,
    request: EncryptRequest,
    message: Option<String>,
    file: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let content = if let Some(msg) = message {
        msg.into_bytes()
    } else if let Some(path) = file {
        std::fs::read(&path)?
    } else {
        Input::<String>::new()
            .with_prompt("Message")
            .interact_text()?
            .into_bytes()
    };
    let content = zeroize::Zeroizing::new(content);

    if request.level == SecurityLevel::Plaintext {
        eprintln!("{}", style("Level 4 sends the message unprotected.").yellow());
    }
    if let Some(to) = &request.recipient {
        eprintln!("{} Encrypting for {} at level {}...", SEND, style(to).cyan(), request.level);
    }

    let orchestrator = build_orchestrator(storage, config, identity)?;
    let envelope = orchestrator
        .encrypt(&content, &request, &interruptible())
        .await
        .map_err(failure)?;
    let json = envelope.to_json().map_err(failure)?;

    match output {
        Some(path) => {
            std::fs::write(&path, json)?;
            eprintln!("{} Envelope written to {}", CHECK, path.display());
        }
        None => println!("{}", json),
    }
    if let (Some(session), true) = (&envelope.key_id, envelope.level.uses_qkd()) {
        eprintln!("  QKD session: {}", style(session).yellow());
    }

    Ok(())
}

async fn decrypt_message(
    storage: &LocalStorage,
    config: &CliConfig,
    identity: &str,
    input: &Path,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(input)?;
    let envelope = EncryptedEnvelope::from_json(&json).map_err(failure)?;

    eprintln!("{} Decrypting level {} envelope...", RECV, envelope.level);

    let orchestrator = build_orchestrator(storage, config, identity)?;
    let plaintext = zeroize::Zeroizing::new(
        orchestrator
            .decrypt(&envelope, &interruptible())
            .await
            .map_err(failure)?,
    );

    match output {
        Some(path) => {
            std::fs::write(&path, plaintext.as_slice())?;
            eprintln!("{} Plaintext written to {}", CHECK, path.display());
        }
        None => println!("{}", String::from_utf8_lossy(&plaintext)),
    }

    Ok(())
}

fn confirmed(prompt: &str, force: bool) -> anyhow::Result<bool> {
    if force {
        return Ok(true);
    }
    let confirm = Confirm::new().with_prompt(prompt).default(false).interact()?;
    if !confirm {
        println!("{} Cancelled", CROSS);
    }
    Ok(confirm)
}

fn rotate_identity(storage: &LocalStorage, identity: &str, force: bool) -> anyhow::Result<()> {
    if !confirmed("Rotate key pair? Messages sealed to the old key become unreadable.", force)? {
        return Ok(());
    }

    let key_pair = storage.key_store()?.rotate(identity).map_err(failure)?;
    storage.directory()?.publish(identity, &key_pair.public_key).map_err(failure)?;

    println!("{} Key pair rotated successfully!", CHECK);
    println!("  New fingerprint: {}", style(key_pair.public_key.fingerprint()).yellow());

    Ok(())
}

fn delete_identity(storage: &LocalStorage, identity: &str, force: bool) -> anyhow::Result<()> {
    if !confirmed("Delete key pair? This cannot be undone.", force)? {
        return Ok(());
    }

    let deleted = storage.key_store()?.delete(identity).map_err(failure)?;
    storage.directory()?.remove(identity).map_err(failure)?;

    if deleted {
        println!("{} Key pair for {} deleted", CHECK, identity);
    } else {
        println!("{} No key pair for {}", CROSS, identity);
    }

    Ok(())
}
