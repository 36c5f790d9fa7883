use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(name = "tablechat")]
#[command(
    about = "Chat with a tabular dataset through generated Python analysis",
    long_about = "Chat with a tabular dataset through generated Python analysis\n\nConfig file loading:\n  - --config <path> (explicit file, overrides default path discovery)\n  - Default probe path when --config is not provided:\n    1. $XDG_CONFIG_HOME/tablechat/config.toml\n    2. ~/.config/tablechat/config.toml"
)]
pub struct CliArgs {
    /// Load config from this file path instead of the default discovery path.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log model HTTP traffic (secrets redacted) to stderr.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Run the HTTP backend that answers chat requests.
    Serve {
        /// Address to listen on.
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
        /// CSV file to load as the table.
        #[arg(long, value_name = "PATH")]
        data: Option<PathBuf>,
        /// Directory where plots are written and served from.
        #[arg(long, value_name = "DIR")]
        static_dir: Option<PathBuf>,
    },
    /// Open the terminal chat against a running backend.
    Chat {
        /// Backend base URL.
        #[arg(long, value_name = "URL")]
        backend: Option<String>,
    },
}
