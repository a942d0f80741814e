use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Kibitzer: a side character that comments on your roleplay.
#[derive(Parser, Debug)]
#[command(name = "kibitzer", about = "In-character commentary on a running conversation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Conversation JSON file.
    #[arg(long, global = true)]
    pub transcript: Option<PathBuf>,

    /// Connection profiles JSON file.
    #[arg(long, global = true)]
    pub profiles: Option<PathBuf>,

    /// Base URL of a host serving presets over HTTP.
    #[arg(long, global = true)]
    pub host_url: Option<String>,

    /// Directory of cached preset `*.json` files.
    #[arg(long, global = true)]
    pub preset_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Count one new message and comment if it is due.
    Trigger,
    /// Comment right now, ignoring the message counter.
    Force,
    /// Apply the quick API override and switch straight back, without generating.
    Connect,
    /// Read `Name: text` lines from stdin and react as they arrive.
    Watch {
        /// Name used for lines typed without a speaker.
        #[arg(long, default_value = "User")]
        user: String,
    },
    /// List presets available from the configured sources.
    Presets,
    /// List connection profiles.
    Profiles,
    /// List OpenRouter models with prompt pricing.
    Models {
        /// Ignore the cached list.
        #[arg(long)]
        refresh: bool,
    },
    /// Show or change settings.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the current settings.
    Show,
    /// Set one field; the value is parsed as JSON, falling back to a plain string.
    Set { key: String, value: String },
}
