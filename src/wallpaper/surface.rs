// Author: Dustin Pilgrim
// License: MIT

use anyhow::Result;
use eventline as el;
use std::time::Duration;

use crate::backdrop::Backdrop;

/// The on-screen desktop window. Only the UI thread touches it.
pub trait Surface {
    /// Drop whatever is currently shown. An error leaves the surface unchanged.
    fn clear(&mut self) -> Result<()>;

    /// Put `backdrop` on screen. An error leaves the surface cleared.
    fn show(&mut self, backdrop: &Backdrop) -> Result<()>;

    /// Service toolkit events, waiting at most `timeout` for them.
    fn dispatch(&mut self, timeout: Duration) -> Result<()>;
}

/// Headless surface: keeps track of what would be shown and logs it.
#[derive(Debug, Default)]
pub struct NullSurface {
    shown: Option<Backdrop>,
}

impl NullSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Option<&Backdrop> {
        self.shown.as_ref()
    }
}

impl Surface for NullSurface {
    fn clear(&mut self) -> Result<()> {
        self.shown = None;
        Ok(())
    }

    fn show(&mut self, backdrop: &Backdrop) -> Result<()> {
        el::info!("headless show backdrop={}", backdrop.describe());
        self.shown = Some(backdrop.clone());
        Ok(())
    }

    fn dispatch(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}
