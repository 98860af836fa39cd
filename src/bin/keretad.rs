// Author: Dustin Pilgrim
// License: MIT

use anyhow::Result;
use clap::Parser;

use kereta::cli::DaemonCli;

fn main() -> Result<()> {
    kereta::daemon::run_daemon(DaemonCli::parse())
}
