// Author: Dustin Pilgrim
// License: MIT

use anyhow::{Result, bail};
use eventline as el;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Parse color from hex string (with or without # prefix)
    /// Examples: "#FF5733", "FF5733"
    pub fn parse(s: &str) -> Result<Rgb> {
        el::scope!(
            "kereta.backdrop.rgb.parse",
            success = "parsed",
            failure = "failed",
            aborted = "aborted",
            {
                let s = s.trim();
                let hex = s.strip_prefix('#').unwrap_or(s);

                if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    bail!("Invalid colour '{s}': expected #RRGGBB");
                }

                let r = u8::from_str_radix(&hex[0..2], 16)?;
                let g = u8::from_str_radix(&hex[2..4], 16)?;
                let b = u8::from_str_radix(&hex[4..6], 16)?;

                el::debug!("parsed input={input} rgb={r},{g},{b}", input = s, r = r, g = g, b = b);

                Ok::<Rgb, anyhow::Error>(Rgb { r, g, b })
            }
        )
    }

    #[inline]
    pub fn xrgb8888(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | (self.b as u32)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// What the desktop is showing: a wallpaper file, or a flat colour when none was found.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Backdrop {
    Image { path: PathBuf },
    Solid { colour: Rgb },
}

impl Backdrop {
    pub fn image_path(&self) -> Option<&std::path::Path> {
        match self {
            Backdrop::Image { path } => Some(path.as_path()),
            Backdrop::Solid { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Backdrop::Image { path } => format!("image {}", path.display()),
            Backdrop::Solid { colour } => format!("solid {}", colour.to_hex()),
        }
    }
}
