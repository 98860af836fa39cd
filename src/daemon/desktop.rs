// Author: Dustin Pilgrim
// License: MIT

use anyhow::Result;
use eventline as el;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::state::save_current;
use crate::backdrop::{Backdrop, Rgb};
use crate::wallpaper::{Resolver, Surface};

/// What the desktop currently shows. `None` means the surface was cleared and
/// nothing could be put back. `generation` counts reloads that touched the surface.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DisplayState {
    pub backdrop: Option<Backdrop>,
    pub generation: u64,
}

impl DisplayState {
    pub fn describe(&self) -> String {
        match &self.backdrop {
            Some(b) => b.describe(),
            None => "nothing".to_string(),
        }
    }
}

/// Read-only handle on the display state, usable from any thread.
#[derive(Clone)]
pub struct StateView {
    state: Arc<Mutex<DisplayState>>,
}

impl StateView {
    pub fn snapshot(&self) -> DisplayState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The desktop window and the record of what it shows. Lives on the UI thread.
pub struct Desktop<S> {
    surface: S,
    resolver: Resolver,
    fallback: Rgb,
    state: Arc<Mutex<DisplayState>>,
    current_path: Option<PathBuf>,
}

impl<S: Surface> Desktop<S> {
    pub fn new(surface: S, resolver: Resolver, fallback: Rgb) -> Self {
        Self {
            surface,
            resolver,
            fallback,
            state: Arc::new(Mutex::new(DisplayState {
                backdrop: Some(Backdrop::Solid { colour: fallback }),
                generation: 0,
            })),
            current_path: None,
        }
    }

    /// Record every applied state to `path` (read by `kereta status`).
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.current_path = Some(path);
        self
    }

    pub fn view(&self) -> StateView {
        StateView {
            state: self.state.clone(),
        }
    }

    /// Re-resolve the wallpaper and swap it onto the surface.
    ///
    /// Resolution happens before the lock is taken; the clear/show sequence and
    /// the state update happen under it, so readers never observe a surface and
    /// a record that disagree.
    ///
    /// If neither the wallpaper nor the solid fallback can be shown, the record
    /// says nothing is shown (matching the cleared surface) and the error is returned.
    pub fn reload(&mut self) -> Result<()> {
        el::scope!(
            "kereta.desktop.reload",
            success = "reloaded",
            failure = "failed",
            aborted = "aborted",
            {
                let wanted = self.resolver.resolve(self.fallback);

                let (snapshot, res) = {
                    let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);

                    // A failed clear leaves the surface as it was, so the record stays valid.
                    self.surface.clear()?;
                    let (shown, res) = show_or_fallback(&mut self.surface, wanted, self.fallback);

                    st.backdrop = shown;
                    st.generation += 1;

                    el::info!(
                        "applied backdrop={} generation={}",
                        st.describe(),
                        st.generation
                    );

                    (st.clone(), res)
                };

                if let Some(path) = &self.current_path {
                    if let Err(e) = save_current(path, &snapshot) {
                        el::warn!("save_current failed err={:#}", e);
                    }
                }

                res
            }
        )
    }

    /// Give the surface a chance to process toolkit events without blocking.
    pub fn pump(&mut self) -> Result<()> {
        self.surface.dispatch(Duration::ZERO)
    }
}

/// Show `wanted`, or the solid fallback if that fails. Returns what ended up on
/// the surface and the last error when nothing did.
fn show_or_fallback<S: Surface>(
    surface: &mut S,
    wanted: Backdrop,
    fallback: Rgb,
) -> (Option<Backdrop>, Result<()>) {
    let err = match surface.show(&wanted) {
        Ok(()) => return (Some(wanted), Ok(())),
        Err(e) => e,
    };

    el::warn!(
        "show failed backdrop={} err={:#}; falling back to solid",
        wanted.describe(),
        err
    );

    let solid = Backdrop::Solid { colour: fallback };
    match surface.show(&solid) {
        Ok(()) => (Some(solid), Ok(())),
        Err(e) => {
            el::error!("solid fallback failed err={:#}; surface left empty", e);
            (None, Err(e.context("show solid fallback")))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::bail;
    use std::fs;
    use std::path::Path;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Op {
        Clear,
        Show(Backdrop),
    }

    /// Records every call; refuses images whose file name contains "broken".
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSurface {
        pub(crate) ops: Arc<Mutex<Vec<Op>>>,
    }

    impl Surface for RecordingSurface {
        fn clear(&mut self) -> Result<()> {
            self.ops.lock().unwrap().push(Op::Clear);
            Ok(())
        }

        fn show(&mut self, backdrop: &Backdrop) -> Result<()> {
            if let Some(p) = backdrop.image_path() {
                if p.to_string_lossy().contains("broken") {
                    bail!("cannot decode {}", p.display());
                }
            }
            self.ops.lock().unwrap().push(Op::Show(backdrop.clone()));
            Ok(())
        }

        fn dispatch(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }
    }

    /// Accepts the first `ok_shows` calls to `show`, then fails every one.
    #[derive(Clone, Default)]
    struct FailingSurface {
        ok_shows: usize,
        shown: Arc<Mutex<Option<Backdrop>>>,
    }

    impl Surface for FailingSurface {
        fn clear(&mut self) -> Result<()> {
            *self.shown.lock().unwrap() = None;
            Ok(())
        }

        fn show(&mut self, backdrop: &Backdrop) -> Result<()> {
            if self.ok_shows == 0 {
                bail!("no configured output");
            }
            self.ok_shows -= 1;
            *self.shown.lock().unwrap() = Some(backdrop.clone());
            Ok(())
        }

        fn dispatch(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }
    }

    fn shown_path(view: &StateView) -> Option<PathBuf> {
        view.snapshot()
            .backdrop
            .and_then(|b| b.image_path().map(Path::to_path_buf))
    }

    fn dirs(tmp: &Path) -> (PathBuf, PathBuf) {
        let user = tmp.join("config");
        let sys = tmp.join("etc-kereta");
        fs::create_dir_all(&user).unwrap();
        fs::create_dir_all(&sys).unwrap();
        (user, sys)
    }

    #[test]
    fn reload_without_wallpaper_shows_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let (user, sys) = dirs(tmp.path());
        let surface = RecordingSurface::default();
        let ops = surface.ops.clone();

        let mut d = Desktop::new(surface, Resolver::new(vec![user, sys]), Rgb::BLACK);
        d.reload().unwrap();

        let solid = Backdrop::Solid { colour: Rgb::BLACK };
        assert_eq!(d.view().snapshot(), DisplayState { backdrop: Some(solid.clone()), generation: 1 });
        assert_eq!(*ops.lock().unwrap(), vec![Op::Clear, Op::Show(solid)]);
    }

    #[test]
    fn higher_priority_wallpaper_wins_on_next_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let (user, sys) = dirs(tmp.path());
        fs::write(sys.join("wall.jpg"), b"jpg").unwrap();

        let mut d = Desktop::new(
            RecordingSurface::default(),
            Resolver::new(vec![user.clone(), sys.clone()]),
            Rgb::BLACK,
        );
        let view = d.view();

        d.reload().unwrap();
        assert_eq!(shown_path(&view), Some(sys.join("wall.jpg")));

        fs::write(user.join("wall.png"), b"png").unwrap();
        // Nothing changes until the next reload.
        assert_eq!(shown_path(&view), Some(sys.join("wall.jpg")));

        d.reload().unwrap();
        assert_eq!(shown_path(&view), Some(user.join("wall.png")));
        assert_eq!(view.snapshot().generation, 2);
    }

    #[test]
    fn undecodable_wallpaper_falls_back_to_solid() {
        let tmp = tempfile::tempdir().unwrap();
        let broken = tmp.path().join("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("wall.png"), b"not a png").unwrap();

        let fallback = Rgb { r: 9, g: 9, b: 9 };
        let mut d = Desktop::new(RecordingSurface::default(), Resolver::new(vec![broken]), fallback);
        d.reload().unwrap();

        assert_eq!(d.view().snapshot().backdrop, Some(Backdrop::Solid { colour: fallback }));
    }

    #[test]
    fn state_file_follows_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let (user, sys) = dirs(tmp.path());
        let state_file = tmp.path().join("state/current.json");
        fs::create_dir_all(state_file.parent().unwrap()).unwrap();

        let mut d = Desktop::new(RecordingSurface::default(), Resolver::new(vec![user, sys]), Rgb::BLACK)
            .with_state_file(state_file.clone());
        d.reload().unwrap();

        let saved = super::super::state::load_current(&state_file).unwrap();
        assert_eq!(saved, d.view().snapshot());
    }

    #[test]
    fn record_follows_surface_when_nothing_can_be_shown() {
        let tmp = tempfile::tempdir().unwrap();
        let (user, sys) = dirs(tmp.path());
        fs::write(user.join("wall.png"), b"png").unwrap();
        let state_file = tmp.path().join("current.json");

        let surface = FailingSurface { ok_shows: 1, ..Default::default() };
        let shown = surface.shown.clone();
        let mut d = Desktop::new(surface, Resolver::new(vec![user.clone(), sys]), Rgb::BLACK)
            .with_state_file(state_file.clone());
        let view = d.view();

        d.reload().unwrap();
        assert_eq!(shown_path(&view), Some(user.join("wall.png")));

        // Wallpaper and solid fallback both fail: surface is empty, and so is the record.
        assert!(d.reload().is_err());
        assert_eq!(*shown.lock().unwrap(), None);
        assert_eq!(view.snapshot(), DisplayState { backdrop: None, generation: 2 });
        assert_eq!(view.snapshot().describe(), "nothing");
        assert_eq!(super::super::state::load_current(&state_file), Some(view.snapshot()));
    }
}
