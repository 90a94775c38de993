//! CLI entry point for `esindex`: inspect and maintain search indexes.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use esindex::config::{self, Config};
use esindex::crypto::{ContentCipher, Sealed};
use esindex::index::{IndexStore, ShrinkProgress};
use esindex::model::UserId;
use esindex::resources::{DeviceResources, HostResources};
use esindex::state::IndexStates;
use esindex::IndexError;

#[derive(Parser)]
#[command(
    name = "esindex",
    version,
    about = "Inspect and maintain encrypted search indexes"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// User whose index to operate on
    #[arg(short, long, global = true, env = "ESINDEX_USER")]
    user: Option<String>,

    /// Directory holding the indexes (overrides the config file)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show index statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Show the oldest indexed message
    Oldest,
    /// Evict the oldest entries until the index fits in TARGET
    Shrink {
        /// Size budget, e.g. `500000`, `200kb`, `50mb`
        #[arg(short, long, value_parser = parse_size)]
        target: u64,
        /// Stop after evicting this many entries
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// Delete every entry but keep the index file
    Clear,
    /// Delete the index files
    Delete,
    /// Write the effective configuration to the config file
    InitConfig,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Stand-in cipher: maintenance commands never open message content.
struct NoKey;

impl ContentCipher for NoKey {
    fn seal(&self, _plaintext: &[u8]) -> esindex::Result<Sealed> {
        Err(IndexError::Crypto("no search key available".into()))
    }

    fn open(&self, _nonce: &[u8], _ciphertext: &[u8]) -> esindex::Result<Vec<u8>> {
        Err(IndexError::Crypto("no search key available".into()))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config();
    if let Some(dir) = cli.data_dir.clone() {
        config.general.data_dir = Some(dir);
    }

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
        Commands::InitConfig => cmd_init_config(&config),
        command => {
            let Some(user) = cli.user.map(UserId::new) else {
                anyhow::bail!("No user given; pass --user or set ESINDEX_USER");
            };
            let store = open_store(&config);
            match command {
                Commands::Stats { json } => cmd_stats(&store, &config, &user, json),
                Commands::Oldest => cmd_oldest(&store, &user),
                Commands::Shrink { target, max_rows } => {
                    cmd_shrink(&store, &user, target, max_rows)
                }
                Commands::Clear => cmd_clear(&store, &user),
                Commands::Delete => cmd_delete(&store, &user),
                Commands::Completions { .. } | Commands::Manpage | Commands::InitConfig => {
                    Ok(())
                }
            }
        }
    }
}

fn open_store(config: &Config) -> IndexStore {
    IndexStore::new(
        config::data_dir(config),
        config.index.clone(),
        Arc::new(IndexStates::new()),
        Arc::new(NoKey),
    )
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = log_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "esindex.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Parse a byte count with an optional `b`, `kb`, `mb`, or `gb` suffix.
fn parse_size(value: &str) -> Result<u64, String> {
    let lower = value.trim().to_lowercase();
    let (number, multiplier) = if let Some(n) = lower.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = lower.strip_suffix('b') {
        (n, 1u64)
    } else {
        (lower.as_str(), 1u64)
    };
    let number: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid size '{value}'"))?;
    number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{value}' is too large"))
}

fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "esindex", &mut std::io::stdout());
    Ok(())
}

fn cmd_manpage() -> anyhow::Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

fn require_index(store: &IndexStore, user: &UserId) -> anyhow::Result<()> {
    if !store.exists(user) {
        anyhow::bail!(
            "No search index for user '{user}' at {}",
            store.index_path(user).display()
        );
    }
    Ok(())
}

fn cmd_init_config(config: &Config) -> anyhow::Result<()> {
    config::save_config(config)?;
    if let Some(path) = config::config_file_path() {
        println!("  Wrote {}", path.display());
    }
    Ok(())
}

fn cmd_stats(store: &IndexStore, config: &Config, user: &UserId, json: bool) -> anyhow::Result<()> {
    require_index(store, user)?;
    let host = HostResources::new(store.dir(), config.cache.memory_limit);
    let free = host.free_disk_space();
    let count = store.count(user)?;
    let searchable = store.content_complete_count(user)?;
    let size = store.size(user)?;
    let content_size = store.summed_row_size(user)?;
    let oldest = store.oldest_entry_date(user)?;

    if json {
        let stats = serde_json::json!({
            "user": user.as_str(),
            "path": store.index_path(user).to_string_lossy(),
            "entries": count,
            "searchable_entries": searchable,
            "size": size,
            "content_size": content_size,
            "oldest": oldest,
            "free_disk": free,
        });
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {:<20} {}", "User", user);
    println!("  {:<20} {}", "Index", store.index_path(user).display());
    println!("  {:<20} {}", "Entries", count);
    println!("  {:<20} {}", "Searchable", searchable);
    println!("  {:<20} {}", "Size on disk", format_size(size, BINARY));
    println!("  {:<20} {}", "Content size", format_size(content_size, BINARY));
    if let Some(oldest) = oldest {
        println!("  {:<20} {}", "Oldest message", oldest);
    }
    println!("  {:<20} {}", "Free disk", format_size(free, BINARY));
    if free < config.index.low_storage_limit {
        println!("  Free space is below the indexing minimum.");
    }
    println!();
    Ok(())
}

fn cmd_oldest(store: &IndexStore, user: &UserId) -> anyhow::Result<()> {
    require_index(store, user)?;
    match (store.oldest_entry_id(user)?, store.oldest_entry_time(user)?) {
        (Some(id), Some(time)) => {
            println!(
                "{id}\t{time}\t{}",
                esindex::model::entry::format_entry_date(time)
            );
        }
        _ => println!("  Index is empty."),
    }
    Ok(())
}

fn cmd_shrink(
    store: &IndexStore,
    user: &UserId,
    target: u64,
    max_rows: Option<usize>,
) -> anyhow::Result<()> {
    require_index(store, user)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} Shrinking {msg}")
            .expect("valid template"),
    );

    let progress = |p: &ShrinkProgress| {
        pb.set_message(format!(
            "{} evicted, ~{} left",
            p.rows_deleted,
            format_size(p.estimated_size, BINARY)
        ));
        pb.tick();
        max_rows.map_or(true, |max| p.rows_deleted < max)
    };
    let report = store.shrink(user, target, Some(&progress))?;
    pb.finish_and_clear();

    println!();
    println!("  {:<20} {}", "Evicted entries", report.rows_deleted);
    println!(
        "  {:<20} {}",
        "Size before",
        format_size(report.size_before, BINARY)
    );
    println!(
        "  {:<20} {}",
        "Size after",
        format_size(report.size_after, BINARY)
    );
    println!("  {:<20} {}", "Target", format_size(target, BINARY));
    if report.exhausted {
        println!("  Index is now empty.");
    } else if report.cancelled {
        println!("  Stopped after {} entries.", report.rows_deleted);
    }
    println!();
    Ok(())
}

fn cmd_clear(store: &IndexStore, user: &UserId) -> anyhow::Result<()> {
    require_index(store, user)?;
    let removed = store.delete_all(user)?;
    println!("  Removed {removed} entries.");
    Ok(())
}

fn cmd_delete(store: &IndexStore, user: &UserId) -> anyhow::Result<()> {
    if store.delete_store(user)? {
        println!("  Deleted search index for '{user}'.");
    } else {
        println!("  No search index for '{user}'.");
    }
    Ok(())
}
