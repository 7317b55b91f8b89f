use clap::{Parser, Subcommand};

use std::path::PathBuf;

use routesync_lib::{config, logging};

/// Routesync - keeps kernel routing table entries in line with a configuration file
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Route configuration file
    #[arg(
        short,
        long,
        env = config::ENV_VAR,
        default_value = config::DEFAULT_PATH,
        )]
    pub config_path: PathBuf,

    /// Write logs to this file instead of stdout
    #[arg(long, env = logging::ENV_VAR_LOG_FILE, default_value = None)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Install every configured route, most specific prefix first
    Apply,
    /// Remove every configured route
    Delete {
        /// Also remove the on-link routes towards each nexthop
        #[arg(long)]
        with_nexthop: bool,
    },
    /// Print the equivalent `ip route` commands without touching the kernel
    Show,
}

pub fn parse() -> Cli {
    Cli::parse()
}
