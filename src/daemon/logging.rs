// Author: Dustin Pilgrim
// License: MIT

use anyhow::{Context, Result};
use std::path::Path;

/// Initialize eventline once, before any other thread starts.
/// `console` mirrors records to stdout for operators running in a terminal.
pub fn init_eventline(log_path: &Path, console: bool) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime for eventline init")?;

    rt.block_on(async {
        eventline::runtime::init().await;
    });

    eventline::runtime::enable_console_output(console);
    eventline::runtime::enable_console_color(console);
    eventline::runtime::enable_console_timestamp(false);
    eventline::runtime::enable_console_duration(true);

    // Single canonical log file
    eventline::runtime::enable_file_output(log_path)
        .with_context(|| format!("enable eventline file output: {}", log_path.display()))?;

    eventline::runtime::set_log_level(eventline::runtime::LogLevel::Info);

    Ok(())
}
