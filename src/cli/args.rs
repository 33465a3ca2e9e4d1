//! CLI argument definitions using clap
//!
//! Commands:
//! - aerokv index --config <path>
//! - aerokv put --key <k> --value <v> --index <n>
//! - aerokv delete --key <k> [--end <e>] --index <n>
//! - aerokv get --key <k> [--end <e>] [--limit <n>] [--revision <r>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aerokv - versioned key-value store paired with a replicated log index
#[derive(Parser, Debug)]
#[command(name = "aerokv")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./aerokv.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the recovered consistent index and current revision
    Index,

    /// Put a key as the effect of log entry `index`
    Put {
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
        /// Log index applied by this write
        #[arg(long)]
        index: u64,
    },

    /// Delete a key, or the range [key, end), as the effect of log entry `index`
    Delete {
        #[arg(long)]
        key: String,
        #[arg(long)]
        end: Option<String>,
        /// Log index applied by this delete
        #[arg(long)]
        index: u64,
    },

    /// Read a key, or the range [key, end)
    Get {
        #[arg(long)]
        key: String,
        #[arg(long)]
        end: Option<String>,
        /// Maximum keys returned (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        /// Revision to read at (0 = latest)
        #[arg(long, default_value_t = 0)]
        revision: i64,
    },
}

impl Command {
    /// Subcommand name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Command::Index => "index",
            Command::Put { .. } => "put",
            Command::Delete { .. } => "delete",
            Command::Get { .. } => "get",
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_put() {
        let cli = Cli::try_parse_from([
            "aerokv", "--config", "/etc/kv.json", "put", "--key", "a", "--value", "1", "--index",
            "7",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/kv.json"));
        match cli.command {
            Command::Put { key, value, index } => {
                assert_eq!((key.as_str(), value.as_str(), index), ("a", "1", 7));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_config_default_and_optional_end() {
        let cli = Cli::try_parse_from(["aerokv", "delete", "--key", "a", "--index", "2"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("./aerokv.json"));
        assert!(matches!(cli.command, Command::Delete { end: None, .. }));
        assert_eq!(cli.command.name(), "delete");
    }

    #[test]
    fn test_put_requires_index() {
        assert!(Cli::try_parse_from(["aerokv", "put", "--key", "a", "--value", "1"]).is_err());
    }
}
