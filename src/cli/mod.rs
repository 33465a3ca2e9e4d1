//! CLI module for aerokv
//!
//! Provides command-line interface for:
//! - index: Report recovered consistent index and revision
//! - put / delete: Apply one write as the effect of a log entry
//! - get: Read keys at a revision

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{delete, execute, get, index, put, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{render_response, write_response};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args())
}
