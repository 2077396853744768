//! Protocol Registry CLI
//!
//! Commands for pushing, reviewing and merging protocol definitions.

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use protocol_registry::{
    BumpKind, CheckStatus, DomainPath, MergeStatus, ProtocolDefinition, ProtocolRegistry,
    ProtocolVersion, RegistryConfig, RegistryError, ReviewState, SubmissionId,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "protocol-registry")]
#[command(about = "Versioned protocol registry with staged review")]
struct Cli {
    /// Path to the registry root (overrides `store.path`)
    #[arg(short, long)]
    registry: Option<PathBuf>,

    /// Extra configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List final protocols
    List {
        /// Only protocols under this domain
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Print a protocol definition
    Pull {
        domain: String,
        name: String,
        /// Archived version (defaults to final)
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Show every committed version of a protocol
    History { domain: String, name: String },

    /// Submit a definition file for review
    Push {
        /// TOML definition
        file: PathBuf,
        /// Explicit version (defaults to the file's version)
        #[arg(short, long, conflicts_with = "bump")]
        version: Option<String>,
        /// Bump the current final version instead
        #[arg(short, long)]
        bump: Option<BumpKind>,
        /// Change note
        #[arg(short, long, default_value = "")]
        note: String,
    },

    /// List submissions under review
    Reviews {
        /// Include decided submissions
        #[arg(short, long)]
        all: bool,
    },

    /// Show one submission with checklist and diff
    Show {
        id: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Approve a submission
    Approve {
        id: String,
        #[arg(long)]
        by: String,
    },

    /// Reject a submission
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
    },

    /// Promote all approved submissions
    Merge {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reject submissions older than the staging window
    Expire,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        #[arg(default_value = "protocols.toml")]
        path: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        RegistryConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if let Some(root) = cli.registry {
        config.store.path = root;
    }

    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Show => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
            ConfigAction::Init { path } => {
                RegistryConfig::default().save(path)?;
                println!("✅ Wrote default configuration to {}", path);
                Ok(())
            }
        };
    }

    let root = config.store.path.clone();
    let registry = ProtocolRegistry::open_dir(&root, config)
        .with_context(|| format!("opening registry at {:?}", root))?;

    match cli.command {
        Commands::List { domain } => {
            let filter = domain.as_deref().map(DomainPath::parse).transpose()?;
            let paths = registry.client().list(filter.as_ref())?;
            if paths.is_empty() {
                println!("No protocols registered yet.");
            } else {
                println!("📚 Protocols:");
                for path in paths {
                    println!("  {}", path);
                }
            }
        }

        Commands::Pull {
            domain,
            name,
            version,
        } => {
            let version = version.as_deref().map(ProtocolVersion::parse).transpose()?;
            let definition =
                registry
                    .client()
                    .pull(&name, &DomainPath::parse(&domain)?, version.as_ref())?;
            print!("{}", definition.to_toml()?);
        }

        Commands::History { domain, name } => {
            let domain = DomainPath::parse(&domain)?;
            let versions = registry.client().history(&name, &domain)?;
            println!("📜 {}/{}:", domain, name);
            let last = versions.len().saturating_sub(1);
            for (i, version) in versions.iter().enumerate() {
                let marker = if i == last { " (final)" } else { "" };
                println!("  {}{}", version, marker);
            }
        }

        Commands::Push {
            file,
            version,
            bump,
            note,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {:?}", file))?;
            let definition = ProtocolDefinition::from_toml(&content)?;
            let domain = definition.domain_path.clone();
            let version = match (version, bump) {
                (Some(v), _) => ProtocolVersion::parse(&v)?,
                (None, Some(kind)) => {
                    match registry.client().pull(&definition.name, &domain, None) {
                        Ok(current) => current.version.bump(kind),
                        Err(RegistryError::NotFound { .. }) => {
                            bail!("{}/{} has no final version to bump", domain, definition.name)
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                (None, None) => definition.version.clone(),
            };

            println!("📤 Pushing {}/{} {}", domain, definition.name, version);
            let id = registry.client().push(definition, domain, version, &note)?;
            println!("✅ Submitted for review as {}", id);
        }

        Commands::Reviews { all } => {
            let records = if all {
                registry.reviews().records()
            } else {
                registry.reviews().opened()
            };
            if records.is_empty() {
                println!("No submissions under review.");
            }
            for record in records {
                let icon = match record.state {
                    ReviewState::Opened => "📝",
                    ReviewState::Approved => "✅",
                    ReviewState::Rejected => "❌",
                };
                println!(
                    "{} {} {} [{}] {}",
                    icon,
                    record.id,
                    record.key,
                    record.state,
                    record.submitted_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Commands::Show { id, json } => {
            let id: SubmissionId = id.parse()?;
            let record = registry
                .reviews()
                .get(&id)
                .ok_or(RegistryError::SubmissionNotFound(id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
                return Ok(());
            }

            println!("📦 Submission: {}", record.id);
            println!("📄 Protocol: {}", record.key);
            println!("📅 Submitted: {}", record.submitted_at.format("%Y-%m-%d %H:%M:%S"));
            println!("🔖 State: {}", record.state);
            if let Some(by) = &record.decided_by {
                println!("👤 Decided by: {}", by);
            }
            if let Some(reason) = &record.reason {
                println!("💬 Reason: {}", reason);
            }
            println!();
            println!("📋 Checklist:");
            for entry in &record.checklist.entries {
                match &entry.status {
                    CheckStatus::Passed => println!("  ✅ {}", entry.item.label()),
                    CheckStatus::NeedsReview => println!("  ⬜ {}", entry.item.label()),
                    CheckStatus::Failed(detail) => {
                        println!("  ❌ {}", entry.item.label());
                        println!("     └─ {}", detail);
                    }
                }
            }
            println!();
            print!("{}", record.diff);
        }

        Commands::Approve { id, by } => {
            let id: SubmissionId = id.parse()?;
            registry.approve(&id, &by)?;
            println!("✅ {} approved by {}", id, by);
        }

        Commands::Reject { id, reason } => {
            let id: SubmissionId = id.parse()?;
            registry.reject(&id, &reason)?;
            println!("❌ {} rejected: {}", id, reason);
        }

        Commands::Merge { json } => {
            let report = registry.on_merged()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.outcomes.is_empty() {
                println!("Nothing approved to merge.");
            } else {
                println!("🔀 Merge batch:");
                for outcome in &report.outcomes {
                    let icon = match outcome.status {
                        MergeStatus::Promoted { .. } => "✅",
                        MergeStatus::Deferred { .. } => "⏳",
                        MergeStatus::Conflict { .. } | MergeStatus::Failed { .. } => "❌",
                    };
                    println!("  {} {} {}", icon, outcome.key, outcome.status);
                }
            }
            if !report.failed().is_empty() {
                std::process::exit(1);
            }
        }

        Commands::Expire => {
            let expired = registry.expire_stale(Utc::now())?;
            if expired.is_empty() {
                println!("No stale submissions.");
            } else {
                println!("⌛ Expired {} submission(s):", expired.len());
                for id in expired {
                    println!("  {}", id);
                }
            }
        }

        Commands::Config { .. } => unreachable!("handled before opening the registry"),
    }

    Ok(())
}
