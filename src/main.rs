use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use sessionkv_core::config::{self, BackendKind, Config};
use sessionkv_core::session::{self, gc, Session, SessionProvider};

#[derive(Parser)]
#[command(
    name = "sessionkv",
    about = "sessionkv - server-side sessions over key-value stores",
    version = sessionkv_core::VERSION,
)]
struct Cli {
    /// Config file (default: ~/.sessionkv/config.json, overridable by env)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,
    /// Print the effective configuration as JSON
    Config,
    /// Show configuration and backend status
    Status,
    /// Create a session under a freshly generated identifier
    New,
    /// Create (or reset) a session
    Init {
        /// Session identifier
        id: String,
    },
    /// Print a session's record, creating it if absent
    Show {
        /// Session identifier
        id: String,
    },
    /// Print one attribute
    Get {
        /// Session identifier
        id: String,
        /// Attribute key
        key: String,
    },
    /// Set an attribute (JSON value, or plain text)
    Set {
        /// Session identifier
        id: String,
        /// Attribute key
        key: String,
        /// Attribute value
        value: String,
    },
    /// Remove an attribute
    Unset {
        /// Session identifier
        id: String,
        /// Attribute key
        key: String,
    },
    /// Delete a session
    Destroy {
        /// Session identifier
        id: String,
    },
    /// Evict sessions idle longer than the max lifetime
    Gc {
        /// Max lifetime in seconds (default from config)
        #[arg(long)]
        max_lifetime: Option<u64>,
        /// Keep running on the configured interval until Ctrl+C
        #[arg(short, long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sessionkv=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match cli.config.as_deref() {
        Some(path) => config::load_config(Some(path)),
        None => config::load_config_from_env(),
    };

    match cli.command {
        Commands::Onboard => cmd_onboard(cli.config)?,
        Commands::Config => cmd_config(&cfg)?,
        Commands::Status => cmd_status(&cfg, cli.config),
        Commands::New => cmd_new(&cfg).await?,
        Commands::Init { id } => cmd_init(&cfg, &id).await?,
        Commands::Show { id } => cmd_show(&cfg, &id).await?,
        Commands::Get { id, key } => cmd_get(&cfg, &id, &key).await?,
        Commands::Set { id, key, value } => cmd_set(&cfg, &id, &key, &value).await?,
        Commands::Unset { id, key } => cmd_unset(&cfg, &id, &key).await?,
        Commands::Destroy { id } => cmd_destroy(&cfg, &id).await?,
        Commands::Gc { max_lifetime, watch } => cmd_gc(&cfg, max_lifetime, watch).await?,
    }

    Ok(())
}

// ====== Commands ======

async fn connect(cfg: &Config) -> Result<Arc<dyn SessionProvider>> {
    if cfg.backend.kind == BackendKind::Memory {
        tracing::warn!("memory backend does not persist between invocations");
    }
    let provider = session::provider_from_config(cfg).await?;
    Ok(Arc::new(provider))
}

/// Parse a CLI value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn cmd_onboard(config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(config::get_config_path);
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    let mut cfg = Config::default();
    cfg.backend.kind = BackendKind::File;
    config::save_config(&cfg, Some(&path))?;
    println!("✓ Created config at {}", path.display());
    println!("  Backend: file ({})", cfg.backend.file.dir_path().display());
    println!("\nEdit backend.kind to \"redis\" or \"dynamodb\" to use a shared store.");
    Ok(())
}

fn cmd_config(cfg: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(cfg)?);
    Ok(())
}

fn cmd_status(cfg: &Config, config_path: Option<PathBuf>) {
    let path = config_path.unwrap_or_else(config::get_config_path);

    println!("sessionkv {} ({}) Status\n", sessionkv_core::VERSION, sessionkv_core::GIT_HASH);
    println!(
        "Config: {} {}",
        path.display(),
        if path.exists() { "✓" } else { "✗" }
    );
    println!("Backend: {}", cfg.backend.kind.as_str());
    match cfg.backend.kind {
        BackendKind::Memory => println!("  (process-local, nothing persists)"),
        BackendKind::File => println!("  Directory: {}", cfg.backend.file.dir_path().display()),
        BackendKind::Redis => println!(
            "  Address: {} (db {}, password {})",
            cfg.backend.redis.addr,
            cfg.backend.redis.db,
            if cfg.backend.redis.password.is_empty() { "not set" } else { "✓" }
        ),
        BackendKind::Dynamodb => println!(
            "  Table: {}{}",
            cfg.backend.dynamodb.table,
            cfg.backend
                .dynamodb
                .endpoint_url
                .as_deref()
                .map(|u| format!(" @ {}", u))
                .unwrap_or_default()
        ),
    }
    println!("Session TTL: {}s", cfg.session.ttl_secs);
    println!("Write mode: {:?}", cfg.session.write_mode);
    println!("Read fallback: {:?}", cfg.session.read_fallback);
    println!(
        "GC: {} (every {}s, max lifetime {}s)",
        if cfg.gc.enabled { "enabled" } else { "disabled" },
        cfg.gc.interval_secs,
        cfg.gc.max_lifetime_secs
    );
}

async fn cmd_new(cfg: &Config) -> Result<()> {
    let id = uuid::Uuid::new_v4().to_string();
    let provider = connect(cfg).await?;
    let session = provider.init(&id).await?;
    println!("{}", session.id());
    Ok(())
}

async fn cmd_init(cfg: &Config, id: &str) -> Result<()> {
    let provider = connect(cfg).await?;
    provider.init(id).await?;
    println!("✓ Initialized session {}", id);
    Ok(())
}

async fn cmd_show(cfg: &Config, id: &str) -> Result<()> {
    let provider = connect(cfg).await?;
    let session = provider.read(id).await?;
    let record = session.record().await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn cmd_get(cfg: &Config, id: &str, key: &str) -> Result<()> {
    let provider = connect(cfg).await?;
    let session = provider.read(id).await?;
    let value = session.get(key).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn cmd_set(cfg: &Config, id: &str, key: &str, raw: &str) -> Result<()> {
    let provider = connect(cfg).await?;
    let session = provider.read(id).await?;
    session.set(key, parse_value(raw)).await?;
    println!("✓ {}.{} set", id, key);
    Ok(())
}

async fn cmd_unset(cfg: &Config, id: &str, key: &str) -> Result<()> {
    let provider = connect(cfg).await?;
    let session = provider.read(id).await?;
    session.delete(key).await?;
    println!("✓ {}.{} removed", id, key);
    Ok(())
}

async fn cmd_destroy(cfg: &Config, id: &str) -> Result<()> {
    let provider = connect(cfg).await?;
    provider.destroy(id).await?;
    println!("✓ Destroyed session {}", id);
    Ok(())
}

async fn cmd_gc(cfg: &Config, max_lifetime: Option<u64>, watch: bool) -> Result<()> {
    let provider = connect(cfg).await?;
    let max_lifetime_secs = max_lifetime.unwrap_or(cfg.gc.max_lifetime_secs);

    if !watch {
        let removed = provider
            .garbage_collect(Duration::from_secs(max_lifetime_secs))
            .await;
        println!("✓ Removed {} session(s)", removed);
        return Ok(());
    }

    let mut gc_config = cfg.gc.clone();
    gc_config.enabled = true;
    gc_config.max_lifetime_secs = max_lifetime_secs;
    let Some(handle) = gc::spawn_from_config(provider, &gc_config) else {
        anyhow::bail!("gc.intervalSecs must be greater than zero to watch");
    };

    tokio::signal::ctrl_c().await?;
    handle.abort();
    println!("\nStopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), serde_json::json!(42));
        assert_eq!(parse_value(r#"{"a":[1,2]}"#), serde_json::json!({"a": [1, 2]}));
        assert_eq!(parse_value("blue"), serde_json::json!("blue"));
        assert_eq!(parse_value("\"quoted\""), serde_json::json!("quoted"));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["sessionkv", "set", "abc", "color", "blue"]).unwrap();
        assert!(matches!(cli.command, Commands::Set { ref id, .. } if id == "abc"));

        let cli = Cli::try_parse_from(["sessionkv", "gc", "--max-lifetime", "60", "-c", "/tmp/c.json"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(matches!(cli.command, Commands::Gc { max_lifetime: Some(60), watch: false }));

        let cli = Cli::try_parse_from(["sessionkv", "config"]).unwrap();
        assert!(matches!(cli.command, Commands::Config));
        let cli = Cli::try_parse_from(["sessionkv", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));
        assert!(Cli::try_parse_from(["sessionkv", "config", "extra"]).is_err());
    }
}
