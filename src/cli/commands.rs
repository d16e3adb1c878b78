//! Command definitions for the site limiter CLI.
//!
//! Uses clap derive macro for argument parsing.

use clap::{Args, Parser, Subcommand};

// ============================================================================
// CLI Structure
// ============================================================================

/// Site limiter CLI - keeps time spent on distracting sites in check
#[derive(Parser, Debug)]
#[command(
    name = "sitelimit",
    version,
    about = "集中を妨げるサイトの閲覧時間を制限するCLI",
    long_about = "監視対象サイトの閲覧にタブ単位のタイマーをかけ、時間切れ後は\n\
                  クールダウン期間中そのサイトをブロックします。\n\
                  バックグラウンドのdaemonが状態を管理し、CLIから操作します。",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show configured sites and running timers
    Status,

    /// Add or update a monitored site
    Add(AddArgs),

    /// Remove a monitored site
    Remove {
        /// Site pattern to remove (domain or domain/path)
        site: String,
    },

    /// Show or update cooldown settings
    Cooldown(CooldownArgs),

    /// Show currently blocked sites
    Blocked,

    /// Manage whitelisted channels and videos
    Whitelist {
        /// Whitelist operation
        #[command(subcommand)]
        command: WhitelistCommands,
    },

    /// Show or update learning mode
    Learning(LearningArgs),

    /// Run as daemon (background service)
    #[command(hide = true)]
    Daemon,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Add Command Arguments
// ============================================================================

/// Arguments for the add command
#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Site to monitor (domain or domain/path; scheme and www. are stripped)
    #[arg(value_parser = clean_site_input)]
    pub site: String,

    /// Timer duration in minutes (1-120)
    #[arg(value_parser = clap::value_parser!(u32).range(1..=120))]
    pub minutes: u32,
}

// ============================================================================
// Cooldown Command Arguments
// ============================================================================

/// Arguments for the cooldown command
///
/// Without flags the current settings are shown.
#[derive(Args, Debug, Clone)]
pub struct CooldownArgs {
    /// Enable the cooldown block window
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    /// Disable the cooldown block window
    #[arg(long)]
    pub disable: bool,

    /// Cooldown duration in minutes (5-480)
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u32).range(5..=480)
    )]
    pub minutes: Option<u32>,
}

impl CooldownArgs {
    /// Returns true if the command only reads settings.
    pub fn is_query(&self) -> bool {
        !self.enable && !self.disable && self.minutes.is_none()
    }
}

// ============================================================================
// Whitelist Subcommands
// ============================================================================

/// Whitelist operations
#[derive(Subcommand, Debug, Clone)]
pub enum WhitelistCommands {
    /// List whitelisted channels
    Channels,

    /// Add a channel (/c/<name>, /channel/<id>, or /@<handle>)
    AddChannel {
        /// Channel path fragment
        #[arg(value_parser = validate_channel)]
        channel: String,
    },

    /// List whitelisted videos
    Videos,

    /// Whitelist the video a URL points at
    AddVideo {
        /// Full video URL
        url: String,
    },
}

// ============================================================================
// Learning Command Arguments
// ============================================================================

/// Arguments for the learning command
///
/// Without flags the current settings are shown.
#[derive(Args, Debug, Clone)]
pub struct LearningArgs {
    /// Switch learning mode on
    #[arg(long, conflicts_with = "off")]
    pub on: bool,

    /// Switch learning mode off
    #[arg(long)]
    pub off: bool,

    /// Session length in minutes (1-480)
    #[arg(
        short,
        long,
        default_value = "60",
        value_parser = clap::value_parser!(u32).range(1..=480)
    )]
    pub minutes: u32,
}

impl LearningArgs {
    /// Returns true if the command only reads settings.
    pub fn is_query(&self) -> bool {
        !self.on && !self.off
    }
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Cleans up a user-supplied site pattern.
///
/// - Strips the scheme and a leading `www.`
/// - Strips a port
/// - Keeps any path suffix so `youtube.com/shorts` stays expressible
/// - Lower-cases the input
fn clean_site_input(s: &str) -> Result<String, String> {
    let mut site = s.trim().to_lowercase();

    if let Some(rest) = site.strip_prefix("https://") {
        site = rest.to_string();
    } else if let Some(rest) = site.strip_prefix("http://") {
        site = rest.to_string();
    }
    if let Some(rest) = site.strip_prefix("www.") {
        site = rest.to_string();
    }

    let (host, path) = match site.split_once('/') {
        Some((host, path)) => (host.to_string(), Some(path.trim_end_matches('/').to_string())),
        None => (site.clone(), None),
    };
    let host = host.split(':').next().unwrap_or_default().to_string();

    if host.is_empty() {
        return Err("サイトを指定してください".to_string());
    }

    Ok(match path {
        Some(path) if !path.is_empty() => format!("{host}/{path}"),
        _ => host,
    })
}

/// Validates a channel path fragment.
fn validate_channel(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("チャンネルを指定してください".to_string());
    }
    Ok(s.to_string())
}

// ============================================================================
// Tests
// ============================================================================
