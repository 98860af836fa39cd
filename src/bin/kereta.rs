// Author: Dustin Pilgrim
// License: MIT

use anyhow::{Result, bail};
use clap::Parser;
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;

use kereta::cli::{Cli, Command};
use kereta::daemon::load_current;
use kereta::path::paths;
use kereta::protocol::Response;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let p = paths(cli.socket.as_deref())?;

    let text = match cli.cmd {
        Command::Reload => "reload".to_string(),
        Command::Exit => "exit".to_string(),
        Command::Send { text } => text,

        Command::Status => {
            match load_current(&p.current_path) {
                Some(st) => println!("{} (generation {})", st.describe(), st.generation),
                None => println!("(daemon has not drawn anything)"),
            }
            return Ok(());
        }

        Command::Socket => {
            println!("{}", p.sock_path.display());
            return Ok(());
        }
    };

    let reply = send(&p.sock_path, &text)?;
    print!("{reply}");

    if Response::is_error(&reply) {
        bail!("daemon rejected {text:?}");
    }
    Ok(())
}

/// One command per connection: write, half-close, read the reply to EOF.
fn send(sock: &Path, text: &str) -> Result<String> {
    let mut stream = UnixStream::connect(sock).map_err(|_| {
        anyhow::anyhow!("keretad not running (socket missing at {})", sock.display())
    })?;

    stream.write_all(text.as_bytes())?;
    stream.shutdown(Shutdown::Write)?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply)?;

    if reply.is_empty() {
        bail!("no reply from keretad (shutting down?)");
    }
    Ok(reply)
}
