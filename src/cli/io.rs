//! Command output
//!
//! Each command prints a single line to stdout, tagged with the command
//! that produced it:
//!
//! ```json
//! {"command":"put","result":{"consistent_index":7,"revision":3}}
//! ```
//!
//! Failures never reach here; `main` prints them to stderr.

use std::io::{self, Write};

use serde_json::{json, Value};

use super::errors::CliResult;

/// Line printed for a successful `command`.
pub fn render_response(command: &str, result: &Value) -> CliResult<String> {
    Ok(serde_json::to_string(&json!({
        "command": command,
        "result": result,
    }))?)
}

pub fn write_response(command: &str, result: &Value) -> CliResult<()> {
    let line = render_response(command, result)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;
    Ok(())
}
