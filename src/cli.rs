//! Command-line argument parsing for rowbridge.

use crate::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// A read-only query bridge for legacy embedded SQL engines.
#[derive(Parser, Debug)]
#[command(name = "rowbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write logs to the state directory instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the agent HTTP server
    Serve {
        /// Address to listen on (overrides config and ROWBRIDGE_BIND)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,

        /// Database URL (overrides config and ROWBRIDGE_DATABASE_URL)
        #[arg(long, value_name = "URL")]
        database_url: Option<String>,
    },

    /// Generate a new agent key and print its [[credentials]] entry
    Keygen {
        /// Label stored with the credential
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
    },

    /// Load the config, print the allowlist and probe the database
    Check,

    /// Send a descriptor file to a remote agent and print the result
    Query {
        /// Agent base URL (e.g., http://192.168.1.100:8001)
        #[arg(long, value_name = "URL")]
        agent: String,

        /// Agent key
        #[arg(long, env = "ROWBRIDGE_AGENT_KEY", value_name = "KEY", hide_env_values = true)]
        key: String,

        /// Descriptor JSON file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page through the result with this page size
        #[arg(long, value_name = "N")]
        page_size: Option<u32>,

        /// Request timeout in seconds
        #[arg(long, value_name = "SECS", default_value = "30")]
        timeout: u64,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies `serve` flags over a loaded config.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Command::Serve { bind, database_url } = &self.command {
            if let Some(bind) = bind {
                config.agent.bind = bind.clone();
            }
            if let Some(url) = database_url {
                config.database.url = url.clone();
            }
        }
    }
}
