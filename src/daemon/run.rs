// Author: Dustin Pilgrim
// License: MIT

use anyhow::{Context, Result, bail};
use std::fs;
use std::os::unix::net::UnixListener;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::backdrop::Rgb;
use crate::cli::DaemonCli;
use crate::logrotate::{self, LogPolicy};
use crate::path::{Paths, create_private_dir, paths};
use crate::session;
use crate::wallpaper::{Mode, NullSurface, Resolver, Screen, Surface};

use super::desktop::Desktop;
use super::listener::{ListenerConfig, bind, serve};
use super::lock::try_acquire_single_instance_lock;
use super::logging::init_eventline;
use super::state::clear_current;
use super::ui::{UiHandle, channel};

pub fn run_daemon(cli: DaemonCli) -> Result<()> {
    let p = paths(cli.socket.as_deref())?;
    let background = Rgb::parse(&cli.background).context("--background")?;
    let mode = Mode::from(cli.mode);
    let listener_cfg = ListenerConfig {
        read_timeout: cli.read_timeout_ms.map(Duration::from_millis),
        max_connections: cli.max_connections,
    };

    fs::create_dir_all(&p.state_dir).context("create state dir")?;
    create_private_dir(&p.runtime_dir)?;

    // Take the lock BEFORE touching the socket file so a live daemon's socket is never unlinked.
    let _lock = match try_acquire_single_instance_lock(&p.lock_path)? {
        Some(f) => f,
        None => {
            eprintln!("keretad: another instance is already running.");
            return Ok(());
        }
    };

    // Rotate/prepare the log file *before* eventline opens it.
    let had_existing = logrotate::prepare_log_file(&p.log_path, LogPolicy::default())
        .with_context(|| format!("prepare_log_file: {}", p.log_path.display()))?;
    if had_existing {
        logrotate::write_raw_blank_line(&p.log_path)
            .with_context(|| format!("write blank line: {}", p.log_path.display()))?;
    }

    init_eventline(&p.log_path, cli.verbose)?;
    eventline::info!("{}", logrotate::run_header());

    if !cli.headless {
        if let Err(e) = session::ensure_wayland_alive() {
            eventline::error!("not starting: {e}");
            bail!("not starting: {e}");
        }
    }

    eventline::scope!(
        "kereta.daemon",
        success = "exiting",
        failure = "crashed",
        aborted = "aborted",
        {
            eventline::info!(
                "startup sock={} runtime_dir={} state_dir={} log={} mode={:?} headless={}",
                p.sock_path.display(),
                p.runtime_dir.display(),
                p.state_dir.display(),
                p.log_path.display(),
                mode,
                cli.headless,
            );

            let listener = bind(&p.sock_path)?;
            let resolver = Resolver::system();

            let res = if cli.headless {
                run_desktop(NullSurface::new(), resolver, background, &p, listener, listener_cfg, false)
            } else {
                let screen = eventline::scope!(
                    "kereta.wayland.connect",
                    success = "ready",
                    failure = "failed",
                    aborted = "aborted",
                    {
                        let screen = Screen::connect(mode, background)?;
                        Ok::<Screen, anyhow::Error>(screen)
                    }
                )?;
                run_desktop(screen, resolver, background, &p, listener, listener_cfg, true)
            };

            let _ = fs::remove_file(&p.sock_path);
            clear_current(&p.current_path);
            eventline::info!("daemon exiting");

            res
        }
    )?;

    Ok(())
}

/// Load the first wallpaper, start the control socket, and run the UI loop
/// on this thread until quit.
fn run_desktop<S: Surface>(
    surface: S,
    resolver: Resolver,
    background: Rgb,
    p: &Paths,
    listener: UnixListener,
    cfg: ListenerConfig,
    watch_session: bool,
) -> Result<()> {
    let mut desktop =
        Desktop::new(surface, resolver, background).with_state_file(p.current_path.clone());

    if let Err(e) = desktop.reload() {
        eventline::error!("initial load failed err={:#}", e);
    }

    let (ui, queue) = channel();
    if watch_session {
        session::spawn_session_watcher(ui.clone());
    }

    // Detached: in-flight connections die with the process.
    let _control = spawn_control_thread(listener, ui, cfg)?;

    queue.run(&mut desktop)
}

fn spawn_control_thread(
    listener: UnixListener,
    ui: UiHandle,
    cfg: ListenerConfig,
) -> Result<JoinHandle<()>> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("kereta-conn")
        .build()
        .context("build control runtime")?;

    std::thread::Builder::new()
        .name("kereta-control".into())
        .spawn(move || {
            if let Err(e) = rt.block_on(serve(listener, ui, cfg)) {
                eventline::error!("control socket stopped err={:#}", e);
            }
        })
        .context("spawn control thread")
}
