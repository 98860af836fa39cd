// Author: Dustin Pilgrim
// License: MIT

//! Hand-off from connection tasks to the UI thread.
//!
//! Any thread may post a [`UiTask`] through a [`UiHandle`]; only the thread
//! running [`UiQueue::run`] executes them, in the order they were posted.

use anyhow::Result;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
};
use std::time::Duration;

use super::desktop::Desktop;
use crate::wallpaper::Surface;

/// Longest the UI thread waits for a task before servicing the display.
pub const UI_TICK: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiTask {
    Reload,
    Quit,
}

/// Held while checking the flag and enqueueing, so nothing is queued behind `Quit`.
type Closed = Arc<Mutex<bool>>;

fn lock(closed: &Closed) -> MutexGuard<'_, bool> {
    closed.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct UiHandle {
    tx: Sender<UiTask>,
    closed: Closed,
}

pub struct UiQueue {
    rx: Receiver<UiTask>,
    closed: Closed,
}

pub fn channel() -> (UiHandle, UiQueue) {
    let (tx, rx) = mpsc::channel();
    let closed = Arc::new(Mutex::new(false));
    (
        UiHandle {
            tx,
            closed: closed.clone(),
        },
        UiQueue { rx, closed },
    )
}

impl UiHandle {
    /// Queue `task` for the UI thread. Returns false once the queue is shut.
    pub fn post(&self, task: UiTask) -> bool {
        let closed = lock(&self.closed);
        if *closed {
            return false;
        }
        self.tx.send(task).is_ok()
    }

    /// Stop accepting work and ask the UI loop to quit.
    pub fn shutdown(&self) {
        let mut closed = lock(&self.closed);
        if !*closed {
            *closed = true;
            let _ = self.tx.send(UiTask::Quit);
        }
    }

    pub fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }
}

impl UiQueue {
    /// Run the UI loop on the calling thread until a quit is requested or
    /// every handle is gone.
    pub fn run<S: Surface>(self, desktop: &mut Desktop<S>) -> Result<()> {
        loop {
            match self.rx.recv_timeout(UI_TICK) {
                Ok(UiTask::Reload) => {
                    if let Err(e) = desktop.reload() {
                        eventline::error!("reload failed err={:#}", e);
                    }
                }
                Ok(UiTask::Quit) => {
                    *lock(&self.closed) = true;
                    eventline::info!("quit requested; leaving ui loop");
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    eventline::info!("ui queue disconnected; leaving ui loop");
                    return Ok(());
                }
            }

            desktop.pump()?;
        }
    }
}
