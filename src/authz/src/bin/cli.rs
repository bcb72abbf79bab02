//! # live-permissions
//!
//! Operator CLI for a live permission store.
//!
//! ```text
//! live-permissions init
//! live-permissions check --actor '{"id":"alice"}' --action view-table --resource fixtures --resource facetable
//! live-permissions check --action view-instance --metrics
//! live-permissions grant --action view-database --resource fixtures --group 1
//! live-permissions list permissions
//! ```
//!
//! Environment variables:
//! - `LIVE_PERMISSIONS_CONFIG` - settings file
//! - `LIVE_PERMISSIONS_DATABASE` - database URL (overrides the settings file)
//! - `RUST_LOG` - log filter (default: warn)

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use live_permissions::{ActionResourceKey, PermissionEngine, Resource, Settings, Subject};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

/// Live permissions operator CLI
#[derive(Parser)]
#[command(name = "live-permissions")]
#[command(about = "Inspect and manage a live permission store")]
#[command(version)]
struct Cli {
    /// Path to settings file (TOML)
    #[arg(short, long, env = "LIVE_PERMISSIONS_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, e.g. sqlite:permissions.db
    #[arg(short, long, env = "LIVE_PERMISSIONS_DATABASE")]
    database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create tables and reserved rows
    Init,

    /// Run a permission check and print its trace
    Check {
        /// Actor as JSON; omit for an unauthenticated check
        #[arg(long)]
        actor: Option<String>,

        #[arg(long)]
        action: String,

        /// Primary resource, then optionally the secondary one
        #[arg(long = "resource")]
        resources: Vec<String>,

        /// Decision to apply when the engine has no opinion
        #[arg(long = "default", value_enum, default_value_t = DefaultPolicy::Deny)]
        default_policy: DefaultPolicy,

        /// Also print the engine metrics in Prometheus text format
        #[arg(long)]
        metrics: bool,
    },

    /// Grant an action-resource to a user or a group
    #[command(group(ArgGroup::new("subject").required(true).args(["user", "group"])))]
    Grant {
        #[arg(long)]
        action: String,

        /// Primary resource, then optionally the secondary one
        #[arg(long = "resource")]
        resources: Vec<String>,

        #[arg(long)]
        user: Option<i64>,

        #[arg(long)]
        group: Option<i64>,
    },

    /// Remove a grant by id
    Revoke { id: i64 },

    /// List the rows of a table
    List {
        #[arg(value_enum)]
        table: Table,
    },

    /// Show row counts per table
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum DefaultPolicy {
    Allow,
    Deny,
}

#[derive(Clone, Copy, ValueEnum)]
enum Table {
    Users,
    Groups,
    Memberships,
    ActionsResources,
    Permissions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},live_permissions={}", log_level, log_level).into()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let settings = load_settings(&cli)?;
    let engine = PermissionEngine::connect(&settings)
        .await
        .with_context(|| format!("Failed to open {}", settings.store.database_url))?;

    let result = run(&engine, cli.command).await;
    engine.close().await;
    result
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    if let Some(database) = &cli.database {
        settings.store.database_url = database.clone();
    }
    debug!("Using database {}", settings.store.database_url);
    Ok(settings)
}

async fn run(engine: &PermissionEngine, command: Command) -> Result<()> {
    let admin = engine.admin();

    match command {
        Command::Init => {
            let counts = admin.init().await.context("Failed to initialize store")?;
            println!(
                "Initialized permission store ({} users, {} groups)",
                counts.users, counts.groups
            );
        }

        Command::Check {
            actor,
            action,
            resources,
            default_policy,
            metrics,
        } => {
            let actor = actor
                .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
                .transpose()
                .context("--actor must be valid JSON")?;
            let resource = parse_resource(&resources)?;

            let evaluation = engine
                .evaluate_resource(actor.as_ref(), &action, &resource)
                .await
                .context("Permission check failed")?;
            print_json(&evaluation)?;

            let allowed = evaluation
                .decision
                .allowed_or(matches!(default_policy, DefaultPolicy::Allow));
            println!("{}", if allowed { "ALLOW" } else { "DENY" });

            if metrics {
                match engine.metrics() {
                    Some(collector) => print!("{}", collector.export_prometheus().await),
                    None => bail!("Metrics are disabled in the engine settings"),
                }
            }
        }

        Command::Grant {
            action,
            resources,
            user,
            group,
        } => {
            let subject = match (user, group) {
                (Some(id), None) => Subject::User(id),
                (None, Some(id)) => Subject::Group(id),
                _ => bail!("Exactly one of --user or --group is required"),
            };
            let key = ActionResourceKey::for_resource(action, &parse_resource(&resources)?);

            let id = admin
                .grant_on(&key, subject)
                .await
                .with_context(|| format!("Failed to grant {}", key))?;
            println!("Granted {} to {:?} (permission {})", key, subject, id);
        }

        Command::Revoke { id } => {
            if admin.revoke(id).await.context("Failed to revoke")? {
                println!("Revoked permission {}", id);
            } else {
                bail!("Permission {} does not exist", id);
            }
        }

        Command::List { table } => match table {
            Table::Users => print_json(&admin.list_users().await?)?,
            Table::Groups => print_json(&admin.list_groups().await?)?,
            Table::Memberships => print_json(&admin.list_memberships().await?)?,
            Table::ActionsResources => print_json(&admin.list_action_resources().await?)?,
            Table::Permissions => print_json(&admin.list_permissions().await?)?,
        },

        Command::Stats => {
            print_json(&admin.counts().await?)?;
        }
    }

    Ok(())
}

/// Zero, one or two `--resource` values
fn parse_resource(values: &[String]) -> Result<Resource> {
    match values {
        [] => Ok(Resource::NoResource),
        [primary] => Ok(Resource::primary(primary.as_str())),
        [primary, secondary] => Ok(Resource::pair(primary.as_str(), secondary.as_str())),
        _ => bail!("At most two --resource values are supported"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
