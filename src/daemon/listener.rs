// Author: Dustin Pilgrim
// License: MIT

use anyhow::{Context, Result};
use eventline as el;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener as StdUnixListener;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::Semaphore;

use super::ui::{UiHandle, UiTask};
use super::utils::{is_client_disconnect, write_reply};
use crate::protocol::{Command, MAX_COMMAND_BYTES, Response};

const ACCEPT_RETRY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, Default)]
pub struct ListenerConfig {
    /// Give up on a silent client after this long. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Cap on connections handled at once. `None` is unbounded.
    pub max_connections: Option<usize>,
}

/// Bind the control socket, replacing a stale socket file, and restrict it to the owner.
pub fn bind(sock_path: &Path) -> Result<StdUnixListener> {
    if fs::symlink_metadata(sock_path).is_ok() {
        fs::remove_file(sock_path)
            .with_context(|| format!("remove stale socket: {}", sock_path.display()))?;
    }

    let listener = StdUnixListener::bind(sock_path)
        .with_context(|| format!("bind control socket: {}", sock_path.display()))?;
    fs::set_permissions(sock_path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("chmod 0600: {}", sock_path.display()))?;

    // Required before handing the socket to tokio.
    listener
        .set_nonblocking(true)
        .context("set_nonblocking on control socket")?;

    Ok(listener)
}

/// Accept loop. Every connection gets its own task; returns once the UI
/// handle is shut down and another connection arrives.
pub async fn serve(listener: StdUnixListener, ui: UiHandle, cfg: ListenerConfig) -> Result<()> {
    let listener = UnixListener::from_std(listener).context("register control socket")?;
    let limit = cfg.max_connections.map(|n| Arc::new(Semaphore::new(n.max(1))));

    el::info!(
        "listening read_timeout_ms={} max_connections={}",
        cfg.read_timeout.map(|t| t.as_millis() as i64).unwrap_or(-1),
        cfg.max_connections.map(|n| n as i64).unwrap_or(-1)
    );

    let mut conn_id: u64 = 0;
    loop {
        let permit = match &limit {
            Some(sem) => Some(
                sem.clone()
                    .acquire_owned()
                    .await
                    .context("connection limit closed")?,
            ),
            None => None,
        };

        let stream = match listener.accept().await {
            Ok((stream, _addr)) => stream,
            Err(e) => {
                el::error!("accept error err={}", e);
                tokio::time::sleep(ACCEPT_RETRY).await;
                continue;
            }
        };

        if ui.is_closed() {
            el::info!("shutting down; no longer accepting commands");
            break;
        }

        conn_id += 1;
        let id = conn_id;
        let ui = ui.clone();
        let read_timeout = cfg.read_timeout;

        tokio::spawn(async move {
            let _permit = permit;
            match handle_client(stream, &ui, read_timeout).await {
                Ok(Some(cmd)) => {
                    el::debug!("client done id={} cmd={}", id, cmd.as_str());
                }
                Ok(None) => {
                    el::debug!("client ignored id={} (shutting down)", id);
                }
                Err(e) if is_client_disconnect(&e) => {
                    el::warn!("client disconnected id={} err={}", id, e);
                }
                Err(e) => {
                    el::error!("client error id={} err={}", id, e);
                }
            }
        });
    }

    Ok(())
}

/// Serve one connection: a single bounded read, one reply line.
///
/// Returns the command that was handled, or `None` when the daemon was
/// already shutting down and the command was dropped without a reply.
pub async fn handle_client<S>(
    mut stream: S,
    ui: &UiHandle,
    read_timeout: Option<Duration>,
) -> io::Result<Option<Command>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; MAX_COMMAND_BYTES];

    let read = match read_timeout {
        Some(t) => match tokio::time::timeout(t, stream.read(&mut buf)).await {
            Ok(r) => r,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "command read timed out")),
        },
        None => stream.read(&mut buf).await,
    };

    // A failed read is answered like any other unrecognised input.
    let cmd = match read {
        Ok(n) => Command::parse(&buf[..n]),
        Err(e) => {
            el::debug!("read failed err={}", e);
            Command::Unknown
        }
    };

    if ui.is_closed() {
        return Ok(None);
    }

    let reply = Response::for_command(cmd);
    match cmd {
        Command::Reload => {
            if !ui.post(UiTask::Reload) {
                return Ok(None);
            }
            write_reply(&mut stream, reply).await?;
        }
        Command::Exit => {
            // The reply goes out before the UI loop is told to quit.
            let res = write_reply(&mut stream, reply).await;
            ui.shutdown();
            res?;
        }
        Command::Unknown => {
            write_reply(&mut stream, reply).await?;
        }
    }

    Ok(Some(cmd))
}
