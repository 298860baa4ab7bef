//! CLI module - Command-line interface for Gatehouse
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

pub use commands::{cmd_bootstrap, cmd_check_config, cmd_init, cmd_permissions};

/// Gatehouse - capability-gated query gateway
/// Tokens, permissions and invitation codes for a small portal
#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    #[command(alias = "daemon")]
    Serve,

    /// Issue the first account code on an empty database
    Bootstrap {
        /// Email address the code is bound to
        #[arg(long)]
        email: String,

        /// Permission granted on redemption (repeatable, default: the whole catalog)
        #[arg(long = "permission", short = 'p')]
        permissions: Vec<String>,

        /// Minutes until the code expires
        #[arg(long)]
        expires_in_minutes: Option<i64>,
    },

    /// Create default config file
    Init,

    /// Validate the configuration and exit
    #[command(alias = "check")]
    CheckConfig,

    /// List known permission names
    #[command(alias = "perms")]
    Permissions,
}
