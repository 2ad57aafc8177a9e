mod host;
mod telemetry;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use rotakey_config::{Config, ConfigStore};
use rotakey_failover::{ErrorClassifier, FailoverEngine, StatusReport, SyncResult};
use rotakey_store::{FileConfigStore, JsonFileCredentialStore};
use rotakey_types::ProviderId;
use std::{path::PathBuf, sync::Arc};

#[derive(Parser, Debug)]
#[command(
    name = "rotakey",
    version,
    about = "Credential and endpoint failover for LLM agents"
)]
struct Cli {
    /// Path to the JSON configuration file (default: ~/.config/rotakey/config.json).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Active-credential file read by the host (default: ~/.rotakey/auth.json).
    #[arg(long, global = true, value_name = "FILE")]
    credentials: Option<PathBuf>,
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the active group, its entries and the active credentials.
    Status {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Make a group active and clear all cooldowns.
    UseGroup {
        /// Group name.
        name: String,
    },
    /// Make a named credential the provider's active one.
    UseCredential {
        /// Provider id.
        provider: String,
        /// Credential name (e.g. primary, backup-1).
        name: String,
    },
    /// Reconcile named credentials with the active-credential file.
    Sync,
    /// Classify an error message as a quota or capacity failure.
    Classify {
        /// The error text.
        text: String,
        /// Provider that produced the error.
        #[arg(long)]
        provider: Option<String>,
    },
    /// Validate the configuration file.
    Check,
    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.log_level);

    let paths = Paths::resolve(cli.config, cli.credentials)?;
    match cli.command {
        Commands::Status { json } => cmd_status(&paths, json).await,
        Commands::UseGroup { name } => cmd_use_group(&paths, &name).await,
        Commands::UseCredential { provider, name } => {
            cmd_use_credential(&paths, &provider, &name).await
        }
        Commands::Sync => cmd_sync(&paths).await,
        Commands::Classify { text, provider } => cmd_classify(&paths, &text, provider).await,
        Commands::Check => cmd_check(&paths),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "rotakey", &mut std::io::stdout());
            Ok(())
        }
    }
}

struct Paths {
    config: PathBuf,
    credentials: PathBuf,
}

impl Paths {
    fn resolve(config: Option<PathBuf>, credentials: Option<PathBuf>) -> Result<Self> {
        let config = match config {
            Some(p) => p,
            None => rotakey_config::paths::config_path()?,
        };
        let credentials = match credentials {
            Some(p) => p,
            None => rotakey_config::paths::credentials_path()?,
        };
        Ok(Self {
            config,
            credentials,
        })
    }
}

async fn open_engine(paths: &Paths) -> Result<FailoverEngine> {
    let engine = FailoverEngine::builder()
        .config_store(Arc::new(FileConfigStore::new(&paths.config)))
        .credential_store(Arc::new(JsonFileCredentialStore::new(&paths.credentials)))
        .host(Arc::new(host::DetachedHost))
        .build();
    engine
        .reload_config()
        .await
        .with_context(|| format!("loading {}", paths.config.display()))?;
    Ok(engine)
}

async fn cmd_status(paths: &Paths, json: bool) -> Result<()> {
    let engine = open_engine(paths).await?;
    engine.match_active_credentials().await;
    let report = engine.status().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_status(&report));
    }
    Ok(())
}

fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    match &report.active_group {
        Some(group) => out.push_str(&format!("group: {group} ({})\n", report.state)),
        None => out.push_str("group: none\n"),
    }
    for entry in &report.entries {
        let state = entry
            .cooldown_remaining_ms
            .map_or_else(|| "ready".to_string(), |ms| format!("cooling down {}s", ms.div_ceil(1000)));
        out.push_str(&format!("  {:<32} {state}\n", entry.id));
    }
    if !report.credentials.is_empty() {
        out.push_str("credentials:\n");
    }
    for provider in &report.credentials {
        let names: Vec<String> = provider
            .names
            .iter()
            .map(|n| {
                if provider.active.as_deref() == Some(n.as_str()) {
                    format!("{n}*")
                } else {
                    n.clone()
                }
            })
            .collect();
        out.push_str(&format!("  {}: {}\n", provider.provider, names.join(" ")));
    }
    out
}

async fn cmd_use_group(paths: &Paths, name: &str) -> Result<()> {
    let engine = open_engine(paths).await?;
    engine.switch_group(name).await?;
    eprintln!("active group: {name}");
    Ok(())
}

async fn cmd_use_credential(paths: &Paths, provider: &str, name: &str) -> Result<()> {
    let engine = open_engine(paths).await?;
    engine
        .switch_credential(&ProviderId::new(provider), name)
        .await?;
    eprintln!("{provider}: using credential '{name}'");
    Ok(())
}

async fn cmd_sync(paths: &Paths) -> Result<()> {
    let engine = open_engine(paths).await?;
    for report in engine.sync_credentials().await {
        let line = match &report.result {
            SyncResult::Matched(name) => format!("active is '{name}'"),
            SyncResult::Unmatched => "active credential is not a named credential".to_string(),
            SyncResult::NoActive => "no active credential".to_string(),
            SyncResult::Imported => "imported active credential as 'primary'".to_string(),
            SyncResult::Failed(e) => format!("error: {e}"),
        };
        println!("{}: {line}", report.provider);
    }
    Ok(())
}

async fn cmd_classify(paths: &Paths, text: &str, provider: Option<String>) -> Result<()> {
    let config = FileConfigStore::new(&paths.config)
        .load_config()
        .await?
        .unwrap_or_default();
    let classifier = ErrorClassifier::from_config(&config.classifier)?;
    let provider = provider.map(ProviderId::new);
    match classifier.classify(Some(text), provider.as_ref()) {
        Some(kind) => println!("{kind}"),
        None => println!("none"),
    }
    Ok(())
}

fn cmd_check(paths: &Paths) -> Result<()> {
    let config = Config::from_file(&paths.config)
        .with_context(|| format!("reading {}", paths.config.display()))?;
    config.validate()?;
    ErrorClassifier::from_config(&config.classifier)?;
    println!(
        "{}: ok ({} groups, {} providers with credentials)",
        paths.config.display(),
        config.groups.len(),
        config.credentials.providers().count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotakey_failover::{CredentialStatus, EntryStatus, FailoverState};

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rotakey",
            "use-credential",
            "anthropic",
            "backup-1",
            "--config",
            "/tmp/c.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(matches!(
            cli.command,
            Commands::UseCredential { ref provider, ref name } if provider == "anthropic" && name == "backup-1"
        ));
    }

    #[test]
    fn test_render_status_marks_active_and_cooldowns() {
        let report = StatusReport {
            active_group: Some("main".into()),
            state: FailoverState::Idle,
            retrying: false,
            entries: vec![
                EntryStatus {
                    id: "p1".into(),
                    cooldown_remaining_ms: Some(1_500),
                },
                EntryStatus {
                    id: "p2/m2".into(),
                    cooldown_remaining_ms: None,
                },
            ],
            credentials: vec![CredentialStatus {
                provider: "p1".into(),
                active: Some("backup-1".into()),
                names: vec!["primary".into(), "backup-1".into()],
            }],
            cooldowns: Vec::new(),
        };
        let out = render_status(&report);
        assert!(out.starts_with("group: main (idle)\n"));
        assert!(out.contains("cooling down 2s"));
        assert!(out.contains("ready"));
        assert!(out.contains("p1: primary backup-1*"));
    }

    #[tokio::test]
    async fn test_use_group_persists_to_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths {
            config: dir.path().join("config.json"),
            credentials: dir.path().join("auth.json"),
        };
        std::fs::write(
            &paths.config,
            r#"{"default_group": "main", "groups": {"main": {"entries": [{"id": "p1"}]}, "alt": {"entries": [{"id": "p2"}]}}}"#,
        )
        .unwrap();

        cmd_use_group(&paths, "alt").await.unwrap();
        let saved = Config::from_file(&paths.config).unwrap();
        assert_eq!(saved.default_group.as_deref(), Some("alt"));
        assert!(cmd_use_group(&paths, "nope").await.is_err());
    }

    #[tokio::test]
    async fn test_status_leaves_config_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths {
            config: dir.path().join("config.json"),
            credentials: dir.path().join("auth.json"),
        };
        let original = r#"{"default_group": "main", "groups": {"main": {"entries": [{"id": "p1"}]}}}"#;
        std::fs::write(&paths.config, original).unwrap();
        std::fs::write(&paths.credentials, r#"{"p1": {"type": "api_key", "key": "a"}}"#).unwrap();

        cmd_status(&paths, true).await.unwrap();
        assert_eq!(std::fs::read_to_string(&paths.config).unwrap(), original);
    }

    #[tokio::test]
    async fn test_use_credential_writes_active_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths {
            config: dir.path().join("config.json"),
            credentials: dir.path().join("auth.json"),
        };
        std::fs::write(
            &paths.config,
            r#"{"credentials": {"p1": {"primary": {"type": "api_key", "key": "a"}, "backup-1": {"type": "api_key", "key": "b"}}}}"#,
        )
        .unwrap();

        cmd_use_credential(&paths, "p1", "backup-1").await.unwrap();
        let raw = std::fs::read_to_string(&paths.credentials).unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["p1"]["key"], "b");
    }
}
