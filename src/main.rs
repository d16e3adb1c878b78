//! Site limiter CLI - per-site time limits with cooldown blocking
//!
//! The background daemon watches navigation events fed by an observer,
//! runs per-tab countdowns on monitored sites, and blocks a site for a
//! cooldown window once its timer expires. This binary is both the daemon
//! (`sitelimit daemon`) and the client used to inspect and configure it.

use anyhow::Result;
use clap::{CommandFactory, Parser};

use sitelimit::cli::{Cli, Commands, Display, IpcClient, WhitelistCommands};
use sitelimit::daemon;
use sitelimit::types::LearningMode;

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let cli = Cli::parse();

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&e.to_string());
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    // Set verbose logging if requested
    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    match cli.command {
        Some(Commands::Status) => {
            let client = IpcClient::new()?;
            let response = client.status().await?;
            Display::show_status(&response);
        }
        Some(Commands::Add(args)) => {
            let client = IpcClient::new()?;
            let response = client.update_site(&args.site, args.minutes).await?;
            Display::show_ack(&response);
        }
        Some(Commands::Remove { site }) => {
            let client = IpcClient::new()?;
            let response = client.remove_site(&site).await?;
            Display::show_ack(&response);
        }
        Some(Commands::Cooldown(args)) => {
            let client = IpcClient::new()?;
            if args.is_query() {
                let response = client.cooldown_settings().await?;
                if let Some(settings) = response.data.and_then(|data| data.cooldown) {
                    Display::show_cooldown(&settings);
                }
            } else {
                let current = client
                    .cooldown_settings()
                    .await?
                    .data
                    .and_then(|data| data.cooldown)
                    .unwrap_or_default();
                let settings = sitelimit::types::CooldownSettings {
                    enabled: (current.enabled || args.enable) && !args.disable,
                    duration_minutes: args.minutes.unwrap_or(current.duration_minutes),
                };
                let response = client.update_cooldown_settings(settings).await?;
                Display::show_ack(&response);
                if let Some(settings) = response.data.and_then(|data| data.cooldown) {
                    Display::show_cooldown(&settings);
                }
            }
        }
        Some(Commands::Blocked) => {
            let client = IpcClient::new()?;
            let response = client.blocked_sites().await?;
            if let Some(blocked) = response.data.and_then(|data| data.blocked_sites) {
                Display::show_blocked(&blocked);
            }
        }
        Some(Commands::Whitelist { command }) => {
            execute_whitelist(command).await?;
        }
        Some(Commands::Learning(args)) => {
            let client = IpcClient::new()?;
            if args.is_query() {
                let response = client.learning_mode().await?;
                if let Some(mode) = response.data.and_then(|data| data.learning_mode) {
                    Display::show_learning(&mode);
                }
            } else {
                let settings = LearningMode {
                    enabled: args.on,
                    enabled_until: 0,
                    duration_minutes: args.minutes,
                };
                let response = client.update_learning_mode(settings).await?;
                Display::show_ack(&response);
                if let Some(mode) = response.data.and_then(|data| data.learning_mode) {
                    Display::show_learning(&mode);
                }
            }
        }
        Some(Commands::Daemon) => {
            daemon::run().await?;
        }
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
        }
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

/// Executes a whitelist subcommand.
async fn execute_whitelist(command: WhitelistCommands) -> Result<()> {
    let client = IpcClient::new()?;
    match command {
        WhitelistCommands::Channels => {
            let response = client.whitelist_channels().await?;
            if let Some(channels) = response.data.and_then(|data| data.channels) {
                Display::show_channels(&channels);
            }
        }
        WhitelistCommands::AddChannel { channel } => {
            let mut channels = client
                .whitelist_channels()
                .await?
                .data
                .and_then(|data| data.channels)
                .unwrap_or_default();
            if !channels.contains(&channel) {
                channels.push(channel);
            }
            let response = client.update_whitelist_channels(channels).await?;
            Display::show_ack(&response);
        }
        WhitelistCommands::Videos => {
            let response = client.whitelist_videos().await?;
            if let Some(videos) = response.data.and_then(|data| data.videos) {
                Display::show_videos(&videos);
            }
        }
        WhitelistCommands::AddVideo { url } => {
            let response = client.add_video(&url).await?;
            Display::show_ack(&response);
        }
    }
    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
