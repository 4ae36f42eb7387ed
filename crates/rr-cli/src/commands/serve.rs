//! Line-delimited JSON request loop
//!
//! Reads one request per line from stdin and writes one response per line to
//! stdout. The open document (if any) is closed when stdin ends.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use tracing::info;

use rr_core::{Commands, Config};

/// Serve requests from stdin until it is closed
pub fn run(config: &Config) -> Result<()> {
    let commands = Commands::new(config);
    let stdin = io::stdin();
    let stdout = io::stdout();

    info!("serving requests on stdin");
    let result = serve(&commands, stdin.lock(), stdout.lock());
    commands.close_file();
    result
}

/// Answer every non-blank line of `input` on `output`
pub fn serve(commands: &Commands, input: impl BufRead, mut output: impl Write) -> Result<()> {
    for line in input.lines() {
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }

        let response = commands.handle_line(&line);
        let encoded = serde_json::to_string(&response).context("Failed to encode response")?;
        writeln!(output, "{}", encoded).context("Failed to write response")?;
        output.flush().context("Failed to write response")?;
    }
    Ok(())
}
