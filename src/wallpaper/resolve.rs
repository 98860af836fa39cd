// Author: Dustin Pilgrim
// License: MIT

use eventline as el;
use std::path::{Path, PathBuf};

use crate::backdrop::{Backdrop, Rgb};

pub const WALL_STEM: &str = "wall";

/// Probe order within one directory.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

pub const SYSTEM_DIR: &str = "/etc/kereta";

/// Fixed, ordered search for `wall.<ext>`: every extension of the first
/// directory is tried before moving to the next directory.
#[derive(Debug, Clone)]
pub struct Resolver {
    dirs: Vec<PathBuf>,
}

impl Resolver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// `~/.config` then `/etc/kereta`.
    pub fn system() -> Self {
        let mut dirs = Vec::with_capacity(2);
        match dirs::home_dir() {
            Some(home) => dirs.push(home.join(".config")),
            None => el::warn!("home directory unknown; skipping user wallpaper"),
        }
        dirs.push(PathBuf::from(SYSTEM_DIR));
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.dirs.iter().flat_map(|dir| {
            SUPPORTED_EXTENSIONS
                .iter()
                .map(move |ext| dir.join(format!("{WALL_STEM}.{ext}")))
        })
    }

    /// First existing wallpaper file, if any.
    pub fn find(&self) -> Option<PathBuf> {
        self.candidates().find(|p| is_file(p))
    }

    pub fn resolve(&self, fallback: Rgb) -> Backdrop {
        match self.find() {
            Some(path) => {
                el::debug!("resolved wallpaper path={}", path.display());
                Backdrop::Image { path }
            }
            None => {
                el::info!("no wallpaper found; using solid {}", fallback.to_hex());
                Backdrop::Solid { colour: fallback }
            }
        }
    }
}

fn is_file(p: &Path) -> bool {
    std::fs::metadata(p).map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(p: &Path) {
        fs::write(p, b"x").unwrap();
    }

    fn fixture() -> (tempfile::TempDir, Resolver) {
        let tmp = tempfile::tempdir().unwrap();
        let user = tmp.path().join("user");
        let sys = tmp.path().join("sys");
        fs::create_dir_all(&user).unwrap();
        fs::create_dir_all(&sys).unwrap();
        let r = Resolver::new(vec![user, sys]);
        (tmp, r)
    }

    #[test]
    fn nothing_found_falls_back_to_solid() {
        let (_tmp, r) = fixture();
        assert_eq!(r.find(), None);
        assert_eq!(r.resolve(Rgb::BLACK), Backdrop::Solid { colour: Rgb::BLACK });
    }

    #[test]
    fn extension_order_within_a_directory() {
        let (_tmp, r) = fixture();
        let user = &r.dirs()[0];
        touch(&user.join("wall.webp"));
        touch(&user.join("wall.jpeg"));
        assert_eq!(r.find(), Some(user.join("wall.jpeg")));

        touch(&user.join("wall.png"));
        assert_eq!(r.find(), Some(user.join("wall.png")));
    }

    #[test]
    fn user_directory_beats_system_directory() {
        let (_tmp, r) = fixture();
        let user = r.dirs()[0].clone();
        let sys = r.dirs()[1].clone();

        touch(&sys.join("wall.jpg"));
        assert_eq!(
            r.resolve(Rgb::BLACK),
            Backdrop::Image { path: sys.join("wall.jpg") }
        );

        // A lower-priority extension in the user dir still wins over the system dir.
        touch(&user.join("wall.webp"));
        assert_eq!(
            r.resolve(Rgb::BLACK),
            Backdrop::Image { path: user.join("wall.webp") }
        );
    }

    #[test]
    fn directories_named_like_wallpapers_are_skipped() {
        let (_tmp, r) = fixture();
        let user = r.dirs()[0].clone();
        fs::create_dir_all(user.join("wall.png")).unwrap();
        touch(&user.join("wall.jpg"));
        assert_eq!(r.find(), Some(user.join("wall.jpg")));
    }

    #[test]
    fn system_resolver_ends_with_etc() {
        let r = Resolver::system();
        assert_eq!(r.dirs().last(), Some(&PathBuf::from(SYSTEM_DIR)));
        let first = r.candidates().next().unwrap();
        assert!(first.ends_with("wall.png"));
    }
}
