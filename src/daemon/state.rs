// Author: Dustin Pilgrim
// License: MIT

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

use super::desktop::DisplayState;

/// Write through a temp file so `kereta status` never reads a half-written record.
pub fn save_current(path: &Path, state: &DisplayState) -> Result<()> {
    let s = serde_json::to_string_pretty(state)?;

    let tmp = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(s.as_bytes()).context("write state")?;
    }
    fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

pub fn load_current(path: &Path) -> Option<DisplayState> {
    let s = fs::read_to_string(path).ok()?;
    serde_json::from_str(&s).ok()
}

pub fn clear_current(path: &Path) {
    let _ = fs::remove_file(path);
}
