//! cloudbase-osutil - run individual OS configuration operations
//!
//! Each subcommand performs one operation against the local host and
//! prints its result as JSON. Logs go to stderr.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use cloudbase_init_rs::config::loader::load_optional;
use cloudbase_init_rs::osutils::BootGate;
use cloudbase_init_rs::platform::RegistryValue;
use cloudbase_init_rs::{OsUtils, Platform, PluginOutcome};

#[derive(Parser)]
#[command(name = "cloudbase-osutil")]
#[command(author, version, about = "Windows OS configuration operations for instance initialization", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file
    #[arg(short, long, env = "CLOUDBASE_OSUTIL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persisted configuration values
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Wait for sysprep generalization to complete
    WaitBoot {
        /// Override the configured timeout, in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List physical Ethernet adapters
    Adapters,
    /// Show the first configured default gateway
    DefaultGateway,
    /// Check whether a route to a destination exists
    RouteExists { destination: Ipv4Addr },
    /// Check whether a local user exists
    UserExists { name: String },
    /// Show a user's SID
    UserSid { name: String },
    /// Show a user's profile directory
    UserHome { name: String },
    /// Show the OS version
    OsVersion,
    /// Show a volume's label
    VolumeLabel {
        /// Root path, e.g. C:\
        drive: String,
    },
    /// Rename the computer (effective after restart)
    Rename { name: String },
    /// Stop a service
    StopService { name: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Read a value
    Get {
        name: String,
        #[arg(long)]
        section: Option<String>,
    },
    /// Write a value
    Set {
        name: String,
        value: String,
        #[arg(long)]
        section: Option<String>,
        /// Stored value kind
        #[arg(long, value_enum, default_value_t = ValueKind::String)]
        kind: ValueKind,
    },
    /// Delete a section
    Delete { section: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ValueKind {
    String,
    Dword,
}

fn init_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Resolve when `signal` fires; never resolve if the handler could not be
/// installed
async fn interrupted(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!("Cannot listen for Ctrl-C, waiting without interruption: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = load_optional(cli.config.as_deref()).await?;
    let platform = Platform::native()?;
    let utils = OsUtils::new(&platform, &config);

    let output = match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Get { name, section } => {
                json!({ "value": utils.store.get(&name, section.as_deref()) })
            }
            ConfigAction::Set {
                name,
                value,
                section,
                kind,
            } => {
                let value = match kind {
                    ValueKind::String => RegistryValue::String(value),
                    ValueKind::Dword => RegistryValue::Dword(
                        value
                            .parse()
                            .with_context(|| format!("{} is not a 32-bit integer", value))?,
                    ),
                };
                utils.store.set(&name, value, section.as_deref())?;
                json!({ "written": true })
            }
            ConfigAction::Delete { section } => {
                utils.store.delete(&section)?;
                json!({ "deleted": section })
            }
        },
        Commands::WaitBoot { timeout } => {
            let gate = match timeout {
                Some(secs) => BootGate::new(
                    platform.registry.clone(),
                    config.boot_poll_interval(),
                    Some(std::time::Duration::from_secs(secs)),
                ),
                None => utils.boot.clone(),
            };
            info!("Waiting for sysprep to complete");
            gate.wait_until(interrupted(tokio::signal::ctrl_c())).await?;
            json!({ "complete": true })
        }
        Commands::Adapters => json!({ "adapters": utils.network.list_adapters().await? }),
        Commands::DefaultGateway => match utils.network.default_gateway().await? {
            Some((interface_index, gateway)) => {
                json!({ "interface_index": interface_index, "gateway": gateway })
            }
            None => json!({ "interface_index": null, "gateway": null }),
        },
        Commands::RouteExists { destination } => {
            json!({ "exists": utils.network.static_route_exists(destination).await? })
        }
        Commands::UserExists { name } => json!({ "exists": utils.accounts.exists(&name).await? }),
        Commands::UserSid { name } => json!({ "sid": utils.accounts.sid(&name).await? }),
        Commands::UserHome { name } => {
            json!({ "home": utils.accounts.home_directory(&name).await? })
        }
        Commands::OsVersion => json!({ "version": utils.host.os_version().await? }),
        Commands::VolumeLabel { drive } => {
            json!({ "label": utils.host.volume_label(&drive).await? })
        }
        Commands::Rename { name } => {
            let changed = utils.host.rename(&name).await?;
            json!({
                "changed": changed,
                "outcome": PluginOutcome::from_reboot_required(changed),
            })
        }
        Commands::StopService { name } => {
            utils.services.stop(&name).await?;
            json!({ "stopped": name })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
