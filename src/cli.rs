// Author: Dustin Pilgrim
// License: MIT

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kereta",
    about = "Control the kereta desktop background daemon",
    version
)]
pub struct Cli {
    /// Control socket (default: $XDG_RUNTIME_DIR/live.sock or /tmp/live-<uid>/live.sock)
    #[arg(long, short = 's', global = true)]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Re-resolve the wallpaper and redraw the desktop.
    Reload,

    /// Stop the daemon.
    Exit,

    /// Send raw text to the control socket and print the reply.
    ///
    /// Examples:
    ///   kereta send RELOAD
    ///   kereta send "hello"
    Send {
        /// Text written to the socket as-is
        text: String,
    },

    /// Show what the daemon last put on screen.
    Status,

    /// Print the control socket path.
    Socket,
}

#[derive(Parser, Debug)]
#[command(
    name = "keretad",
    about = "Desktop background renderer with a local control socket",
    version
)]
pub struct DaemonCli {
    /// Control socket (default: $XDG_RUNTIME_DIR/live.sock or /tmp/live-<uid>/live.sock)
    #[arg(long, short = 's')]
    pub socket: Option<PathBuf>,

    /// Scaling mode for the wallpaper.
    ///
    /// fill:    fill output, crop as needed (default)
    /// fit:     fit entire image, letterbox
    /// stretch: stretch to output
    /// center:  center without scaling
    /// tile:    tile image
    #[arg(long, short = 'm', value_enum, default_value_t = ModeArg::Fill)]
    pub mode: ModeArg,

    /// Colour shown when no wallpaper exists, and behind letterboxed images.
    #[arg(long, short = 'b', default_value = "#000000")]
    pub background: String,

    /// Run without a display (state changes are only logged).
    #[arg(long)]
    pub headless: bool,

    /// Answer a client that sends nothing within this many milliseconds.
    /// Without it a silent client is waited on indefinitely.
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Maximum connections handled at once (default: unbounded).
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Mirror the log to stdout.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ModeArg {
    Fill,
    Fit,
    Stretch,
    Center,
    Tile,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn clap_definitions_are_consistent() {
        Cli::command().debug_assert();
        DaemonCli::command().debug_assert();
    }

    #[test]
    fn daemon_defaults() {
        let cli = DaemonCli::try_parse_from(["keretad"]).unwrap();
        assert!(matches!(cli.mode, ModeArg::Fill));
        assert_eq!(cli.background, "#000000");
        assert!(!cli.headless);
        assert!(cli.read_timeout_ms.is_none());
        assert!(cli.max_connections.is_none());
    }

    #[test]
    fn client_socket_flag_is_global() {
        let cli = Cli::try_parse_from(["kereta", "reload", "--socket", "/tmp/x.sock"]).unwrap();
        assert!(matches!(cli.cmd, Command::Reload));
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
    }
}
