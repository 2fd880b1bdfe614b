//! CLI command definitions
//!
//! Defines the clap commands for behat-bridge.

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Project root (default: config `project.root`, then the current directory)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Root behat config file (default: behat.yml, .behat.yml or behat.yml.dist in the project)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the suites a run would register
    Suites {
        /// Specific module suite to load, in @modulename or @vendor/modulename format.
        /// The module needs a behat.yml with a suite of the same name unless the suite is
        /// registered centrally.
        module: Option<String>,

        /// Only resolve a specific suite
        #[arg(long, short)]
        suite: Option<String>,

        /// Initialization mode: resolve nothing for module or suite requests
        #[arg(long)]
        init: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Captured email management
    #[command(subcommand)]
    Email(EmailCommands),

    /// Print the parameters available to %placeholder% interpolation
    Params,
}

#[derive(Subcommand)]
pub enum EmailCommands {
    /// Capture an outgoing email (JSON) into the session state
    Record {
        /// JSON file holding the message (default: stdin)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Session key (default: $BEHAT_BRIDGE_SESSION or config)
        #[arg(long)]
        session: Option<String>,
    },

    /// Find captured emails; arguments starting with '/' are regular expressions
    Find {
        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        content: Option<String>,

        /// Only the most recent match; exits with status 1 when nothing matches
        #[arg(long)]
        last: bool,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,

        /// Session key (default: $BEHAT_BRIDGE_SESSION or config)
        #[arg(long)]
        session: Option<String>,
    },

    /// Forget every captured email
    Clear {
        /// Session key (default: $BEHAT_BRIDGE_SESSION or config)
        #[arg(long)]
        session: Option<String>,
    },
}

/// Output format for resolved suites
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Yaml,
}
