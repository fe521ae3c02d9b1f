//! Catalyst Core Character Vault CLI
//!
//! Thin wrapper around cccg-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Show vault information
//! cccg info
//!
//! # Save a character sheet from JSON
//! cccg character save Nova --json '{"hp": 12}'
//!
//! # Load it back (local first, then cloud)
//! cccg character load Nova
//!
//! # List characters on this device and in the cloud
//! cccg character list
//!
//! # Lock a character with a PIN, then load it with the PIN
//! cccg character pin set Nova 1357
//! cccg character load Nova --pin 1357
//!
//! # Register and log in a player
//! cccg player register Eve --password hunter2
//! cccg player login Eve --password hunter2
//!
//! # Produce a director PIN artifact and store it in config.json
//! cccg dm generate-pin 2468 --save
//!
//! # Mirror every cloud save onto this device
//! cccg cache refresh
//!
//! # Browse autosave history
//! cccg backups list Nova
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cccg_core::{
    CharacterVault, Credential, KeyRole, Record, SaveKey, SaveReport, VaultConfig,
};
use clap::{Parser, Subcommand};

/// Catalyst Core Character Vault
#[derive(Parser)]
#[command(name = "cccg")]
#[command(version = "0.1.0")]
#[command(about = "Catalyst Core Character Vault - local-first character saves")]
#[command(
    long_about = "Saves character sheets on this device first and keeps a best-effort copy in a Realtime Database."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.cccg/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Realtime Database root, overriding config.json
    #[arg(long, global = true, env = "CCCG_CLOUD_URL")]
    cloud_url: Option<String>,

    /// Database auth token, overriding config.json
    #[arg(long, global = true, env = "CCCG_CLOUD_AUTH", hide_env_values = true)]
    cloud_auth: Option<String>,

    /// Run without any cloud backend
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show vault information
    Info,

    /// Character sheet management
    Character {
        #[command(subcommand)]
        action: CharacterAction,
    },

    /// Player profiles
    Player {
        #[command(subcommand)]
        action: PlayerAction,
    },

    /// Director access
    Dm {
        #[command(subcommand)]
        action: DmAction,
    },

    /// Local mirror of cloud saves
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Cloud autosave history
    Backups {
        #[command(subcommand)]
        action: BackupsAction,
    },
}

#[derive(Subcommand)]
enum CharacterAction {
    /// Save a character sheet
    Save {
        /// Character name
        name: String,
        #[command(flatten)]
        input: RecordInput,
        #[command(flatten)]
        unlock: PinArg,
    },
    /// Load a character sheet and print it as JSON
    Load {
        /// Character name
        name: String,
        #[command(flatten)]
        unlock: PinArg,
    },
    /// List characters
    List {
        /// List player profiles instead of character sheets
        #[arg(long)]
        profiles: bool,
    },
    /// Move a character sheet to a new name
    Rename {
        /// Current name
        from: String,
        /// New name
        to: String,
        #[command(flatten)]
        unlock: PinArg,
    },
    /// Delete a character sheet
    Delete {
        /// Character name
        name: String,
        #[command(flatten)]
        unlock: PinArg,
    },
    /// Per-character PIN locks
    Pin {
        #[command(subcommand)]
        action: PinAction,
    },
}

#[derive(Subcommand)]
enum PinAction {
    /// Lock a character with a PIN
    Set {
        /// Character name
        name: String,
        /// The new PIN
        pin: String,
        /// Current PIN, when replacing one
        #[arg(long)]
        current: Option<String>,
    },
    /// Remove a character's PIN
    Clear {
        /// Character name
        name: String,
        /// Current PIN
        #[arg(long)]
        pin: String,
    },
    /// Show whether a character is locked
    Status {
        /// Character name
        name: String,
    },
}

/// PIN for a locked character
#[derive(clap::Args)]
struct PinArg {
    /// PIN of a locked character
    #[arg(long)]
    pin: Option<String>,
}

impl PinArg {
    fn unlock(&self, vault: &CharacterVault, key: &SaveKey) -> Result<()> {
        if let Some(pin) = &self.pin {
            vault.unlock_character(key, pin)?;
        }
        Ok(())
    }
}

#[derive(Subcommand)]
enum PlayerAction {
    /// Create a player profile
    Register {
        /// Player name
        name: String,
        #[arg(short, long)]
        password: String,
    },
    /// Check a player's password and show their character
    Login {
        /// Player name
        name: String,
        #[arg(short, long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum DmAction {
    /// Check the director PIN
    Login {
        #[arg(long)]
        pin: String,
    },
    /// Produce a director PIN artifact
    GeneratePin {
        /// The PIN to hash
        pin: String,
        /// PBKDF2 iterations
        #[arg(long, default_value_t = cccg_core::credentials::DEFAULT_ITERATIONS)]
        iterations: u32,
        /// Store the artifact in config.json
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Copy every cloud save onto this device
    Refresh,
}

#[derive(Subcommand)]
enum BackupsAction {
    /// Push a snapshot into the autosave history
    Save {
        /// Character name
        name: String,
        #[command(flatten)]
        input: RecordInput,
    },
    /// List autosave timestamps, newest first
    List {
        /// Character name
        name: String,
    },
    /// Print one autosave entry
    Load {
        /// Character name
        name: String,
        /// Timestamp from `backups list`
        timestamp: i64,
    },
}

/// Where a record's JSON comes from
#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct RecordInput {
    /// Record as inline JSON
    #[arg(long)]
    json: Option<String>,
    /// Path to a JSON file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl RecordInput {
    fn read(&self) -> Result<Record> {
        let text = match (&self.json, &self.file) {
            (Some(json), _) => json.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?,
            (None, None) => anyhow::bail!("provide --json or --file"),
        };
        Ok(Record::from_json(&text)?)
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.cccg/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cccg")
        .join("data")
}

/// config.json with command-line overrides applied
fn load_config(cli: &Cli, data_dir: &Path) -> Result<VaultConfig> {
    let mut config = VaultConfig::load(data_dir)?;
    if let Some(url) = &cli.cloud_url {
        config.cloud_url = Some(url.clone());
    }
    if let Some(auth) = &cli.cloud_auth {
        config.cloud_auth = Some(auth.clone());
    }
    if cli.offline {
        config.cloud_url = None;
    }
    Ok(config)
}

fn print_record(record: &Record) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record.fields())?);
    Ok(())
}

fn print_report(report: &SaveReport) {
    let leg = |ok: bool| if ok { "yes" } else { "no" };
    println!("Saved {}", report.key);
    println!("  Local: {}", leg(report.local));
    println!("  Cloud: {}", leg(report.cloud));
    if let Some(e) = &report.local_error {
        println!("  Local error: {}", e);
    }
    if let Some(e) = &report.cloud_error {
        println!("  Cloud error: {}", e);
    }
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "(invalid time)".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config = load_config(&cli, &data_dir)?;

    // Needs no vault
    if let Commands::Dm {
        action: DmAction::GeneratePin { pin, iterations, save },
    } = &cli.command
    {
        tracing::debug!(iterations, "Generating director PIN artifact");
        let credential = Credential::generate(pin, *iterations)?;
        println!("{}", credential.to_pretty_json()?);
        if *save {
            let mut stored = VaultConfig::load(&data_dir)?;
            stored.dm_credential = Some(credential);
            stored.save(&data_dir)?;
            eprintln!("Stored in {}", VaultConfig::path_in(&data_dir).display());
        }
        return Ok(());
    }

    tracing::info!("Opening vault in {:?}", data_dir);
    let vault = CharacterVault::open(&data_dir, config).await?;
    let result = run(&vault, cli.command).await;
    vault.shutdown().await;
    result
}

async fn run(vault: &CharacterVault, command: Commands) -> Result<()> {
    match command {
        Commands::Info => {
            let info = vault.info()?;

            println!("Catalyst Core Character Vault v0.1.0");
            println!();
            if let Some(dir) = &info.data_dir {
                println!("Data directory: {}", dir.display());
            }
            println!("Cloud: {}", info.cloud);
            println!("Characters: {}", info.local_characters);
            println!("Profiles: {}", info.local_profiles);
            match &info.last_save {
                Some(key) => println!("Last save: {}", key),
                None => println!("Last save: (none)"),
            }
            println!(
                "DM PIN: {}",
                if info.dm_configured { "configured" } else { "not configured" }
            );
        }

        Commands::Character { action } => match action {
            CharacterAction::Save { name, input, unlock } => {
                let record = input.read()?;
                let key = SaveKey::player(&name)?;
                unlock.unlock(vault, &key)?;
                tracing::info!(%key, fields = record.fields().len(), "Saving character");
                let report = vault.save_character(&key, &record).await?;
                print_report(&report);
            }

            CharacterAction::Load { name, unlock } => {
                let key = SaveKey::player(&name)?;
                unlock.unlock(vault, &key)?;
                tracing::debug!(%key, "Loading character");
                let record = vault.load_character_by_key(&key).await?;
                print_record(&record)?;
            }

            CharacterAction::List { profiles } => {
                let role = if profiles { KeyRole::User } else { KeyRole::Player };
                let keys = vault.list_characters(role).await?;
                tracing::debug!(%role, count = keys.len(), "Listed characters");
                if keys.is_empty() {
                    println!("No {}s found.", if profiles { "profile" } else { "character" });
                } else {
                    let label = if profiles { "Profiles" } else { "Characters" };
                    println!("{} ({}):", label, keys.len());
                    for key in keys {
                        println!("  {}", key.display_name());
                    }
                }
            }

            CharacterAction::Rename { from, to, unlock } => {
                let from = SaveKey::player(&from)?;
                let to = SaveKey::player(&to)?;
                unlock.unlock(vault, &from)?;
                tracing::info!(%from, %to, "Renaming character");
                let record = vault.load_character_by_key(&from).await?;
                let report = vault.rename_character(&from, &to, &record).await?;
                println!("Renamed {} -> {}", from.display_name(), to.display_name());
                print_report(&report);
            }

            CharacterAction::Delete { name, unlock } => {
                let key = SaveKey::player(&name)?;
                unlock.unlock(vault, &key)?;
                tracing::info!(%key, "Deleting character");
                vault.delete_character(&key).await?;
                println!("Deleted character: {}", key.display_name());
            }

            CharacterAction::Pin { action } => match action {
                PinAction::Set { name, pin, current } => {
                    let key = SaveKey::player(&name)?;
                    if let Some(current) = &current {
                        vault.unlock_character(&key, current)?;
                    }
                    vault.set_character_pin(&key, &pin)?;
                    println!("PIN set for {}", key.display_name());
                }
                PinAction::Clear { name, pin } => {
                    let key = SaveKey::player(&name)?;
                    vault.unlock_character(&key, &pin)?;
                    vault.clear_character_pin(&key)?;
                    println!("PIN removed from {}", key.display_name());
                }
                PinAction::Status { name } => {
                    let key = SaveKey::player(&name)?;
                    let locked = vault.has_character_pin(&key)?;
                    println!(
                        "{}: {}",
                        key.display_name(),
                        if locked { "locked" } else { "no PIN" }
                    );
                }
            },
        },

        Commands::Player { action } => match action {
            PlayerAction::Register { name, password } => {
                tracing::info!(%name, "Registering player");
                let key = vault.register_player(&name, &password).await?;
                println!("Registered player: {}", key.display_name());
            }

            PlayerAction::Login { name, password } => {
                let session = vault.login_player(&name, &password).await?;
                println!("Logged in as {}", session.display_name);
                match vault.initial_record() {
                    Ok(record) if record.is_empty() => println!("  Character: (new sheet)"),
                    Ok(record) => {
                        println!("  Character: {} ({} fields)", session.key, record.fields().len())
                    }
                    Err(cccg_core::PersistError::Unauthorized(_)) => {
                        println!("  Character: {} (locked by a PIN)", session.key)
                    }
                    Err(e) => return Err(e.into()),
                }
                vault.logout().await;
            }
        },

        Commands::Dm { action } => match action {
            DmAction::Login { pin } => {
                if !vault.login_dm(&pin).await {
                    tracing::warn!("Director PIN rejected");
                    anyhow::bail!("DM login failed");
                }
                println!("Logged in as {}", cccg_core::DIRECTOR_CHARACTER_NAME);
                vault.logout().await;
            }
            // Handled before the vault is opened
            DmAction::GeneratePin { .. } => {}
        },

        Commands::Cache { action } => match action {
            CacheAction::Refresh => {
                tracing::info!(cloud = vault.cloud_kind(), "Refreshing local cache");
                let report = vault.cache_cloud_saves().await?;
                println!("Cache refreshed: {}", report);
                for (key, reason) in &report.failed {
                    println!("  {}: {}", key, reason);
                }
            }
        },

        Commands::Backups { action } => match action {
            BackupsAction::Save { name, input } => {
                let record = input.read()?;
                let key = SaveKey::player(&name)?;
                let ts = vault.save_cloud_autosave(&key, &record).await?;
                println!("Autosaved {} at {}", key, ts);
            }

            BackupsAction::List { name } => {
                let key = SaveKey::player(&name)?;
                let stamps = vault.list_cloud_backups(&key).await?;
                if stamps.is_empty() {
                    println!("No autosaves for {}.", key.display_name());
                } else {
                    println!("Autosaves for {} ({}):", key.display_name(), stamps.len());
                    for ts in stamps {
                        println!("  {}  {}", ts, format_timestamp(ts));
                    }
                }
            }

            BackupsAction::Load { name, timestamp } => {
                let key = SaveKey::player(&name)?;
                let record = vault.load_cloud_backup(&key, timestamp).await?;
                print_record(&record)?;
            }
        },
    }

    Ok(())
}
