// Author: Dustin Pilgrim
// License: MIT

use image::{RgbaImage, imageops::FilterType};

use crate::backdrop::Rgb;

/// How a wallpaper larger or smaller than the output is placed on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    #[default]
    Fill,
    Fit,
    Stretch,
    Center,
    Tile,
}

impl From<crate::cli::ModeArg> for Mode {
    fn from(m: crate::cli::ModeArg) -> Self {
        match m {
            crate::cli::ModeArg::Fill => Mode::Fill,
            crate::cli::ModeArg::Fit => Mode::Fit,
            crate::cli::ModeArg::Stretch => Mode::Stretch,
            crate::cli::ModeArg::Center => Mode::Center,
            crate::cli::ModeArg::Tile => Mode::Tile,
        }
    }
}

/// Decoded content waiting to be laid out on each output.
pub(crate) enum Content {
    Solid(Rgb),
    Image { src: RgbaImage, bg: Rgb },
}

/// Produce one XRGB8888 frame of `dw` x `dh` pixels.
pub(crate) fn render_frame(dw: usize, dh: usize, content: &Content, mode: Mode) -> Vec<u32> {
    match content {
        Content::Solid(c) => vec![c.xrgb8888(); dw * dh],
        Content::Image { src, bg } => render_image(dw, dh, src, mode, *bg),
    }
}

fn render_image(dw: usize, dh: usize, src: &RgbaImage, mode: Mode, bg: Rgb) -> Vec<u32> {
    let mut out = vec![bg.xrgb8888(); dw * dh];
    if dw == 0 || dh == 0 || src.width() == 0 || src.height() == 0 {
        return out;
    }

    let canvas = Canvas { px: &mut out, w: dw, h: dh, bg };

    match mode {
        Mode::Stretch => {
            let resized = image::imageops::resize(src, dw as u32, dh as u32, FilterType::Triangle);
            canvas.blit(&resized, 0, 0);
        }
        Mode::Fit => {
            let (rw, rh, ox, oy) = fit_rect(src.width(), src.height(), dw as u32, dh as u32);
            let resized = image::imageops::resize(src, rw, rh, FilterType::Triangle);
            canvas.blit(&resized, ox as i32, oy as i32);
        }
        Mode::Fill => {
            let (rw, rh) = fill_size(src.width(), src.height(), dw as u32, dh as u32);
            let resized = image::imageops::resize(src, rw, rh, FilterType::Triangle);
            // Negative offset crops the overflow evenly on both sides.
            let ox = -(((rw as i64 - dw as i64) / 2).max(0) as i32);
            let oy = -(((rh as i64 - dh as i64) / 2).max(0) as i32);
            canvas.blit(&resized, ox, oy);
        }
        Mode::Center => {
            let ox = (dw as i32 - src.width() as i32) / 2;
            let oy = (dh as i32 - src.height() as i32) / 2;
            canvas.blit(src, ox, oy);
        }
        Mode::Tile => canvas.tile(src),
    }

    out
}

struct Canvas<'a> {
    px: &'a mut [u32],
    w: usize,
    h: usize,
    bg: Rgb,
}

impl Canvas<'_> {
    /// Copy `src` with its top-left corner at (ox, oy), clipped to the canvas.
    fn blit(self, src: &RgbaImage, ox: i32, oy: i32) {
        let x0 = ox.max(0);
        let y0 = oy.max(0);
        let x1 = (ox + src.width() as i32).min(self.w as i32);
        let y1 = (oy + src.height() as i32).min(self.h as i32);

        if x1 <= x0 || y1 <= y0 {
            return;
        }

        for y in y0..y1 {
            let sy = (y - oy) as u32;
            let row = (y as usize) * self.w;
            for x in x0..x1 {
                let sx = (x - ox) as u32;
                self.px[row + x as usize] = over_bg(src.get_pixel(sx, sy).0, self.bg);
            }
        }
    }

    fn tile(self, src: &RgbaImage) {
        let sw = src.width() as usize;
        let sh = src.height() as usize;

        for y in 0..self.h {
            let row = y * self.w;
            for x in 0..self.w {
                let px = src.get_pixel((x % sw) as u32, (y % sh) as u32).0;
                self.px[row + x] = over_bg(px, self.bg);
            }
        }
    }
}

fn fit_rect(sw: u32, sh: u32, dw: u32, dh: u32) -> (u32, u32, u32, u32) {
    let scale = (dw as f32 / sw as f32).min(dh as f32 / sh as f32).max(0.0);
    let rw = (sw as f32 * scale).round().max(1.0) as u32;
    let rh = (sh as f32 * scale).round().max(1.0) as u32;

    (rw, rh, dw.saturating_sub(rw) / 2, dh.saturating_sub(rh) / 2)
}

fn fill_size(sw: u32, sh: u32, dw: u32, dh: u32) -> (u32, u32) {
    let scale = (dw as f32 / sw as f32).max(dh as f32 / sh as f32).max(0.0);
    let rw = (sw as f32 * scale).round().max(dw as f32).max(1.0) as u32;
    let rh = (sh as f32 * scale).round().max(dh as f32).max(1.0) as u32;

    (rw, rh)
}

/// Alpha-composite one RGBA pixel over the background colour.
fn over_bg(px: [u8; 4], bg: Rgb) -> u32 {
    let [r, g, b, a] = px.map(u32::from);

    if a == 255 {
        return (r << 16) | (g << 8) | b;
    }
    if a == 0 {
        return bg.xrgb8888();
    }

    let inv = 255 - a;
    let mix = |c: u32, under: u8| (c * a + under as u32 * inv) / 255;

    (mix(r, bg.r) << 16) | (mix(g, bg.g) << 8) | mix(b, bg.b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: u32 = 0x00FF_0000;
    const BLUE_BG: Rgb = Rgb { r: 0, g: 0, b: 255 };

    fn red(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255]))
    }

    #[test]
    fn solid_fills_every_pixel() {
        let c = Rgb { r: 1, g: 2, b: 3 };
        let f = render_frame(4, 3, &Content::Solid(c), Mode::Fill);
        assert_eq!(f.len(), 12);
        assert!(f.iter().all(|&p| p == 0x0001_0203));
    }

    #[test]
    fn fill_covers_the_whole_output() {
        let content = Content::Image { src: red(2, 1), bg: BLUE_BG };
        let f = render_frame(8, 8, &content, Mode::Fill);
        assert!(f.iter().all(|&p| p == RED));
    }

    #[test]
    fn fit_letterboxes_with_background() {
        let content = Content::Image { src: red(4, 2), bg: BLUE_BG };
        let f = render_frame(4, 4, &content, Mode::Fit);
        // Top and bottom rows are letterbox, middle rows are image.
        assert!(f[..4].iter().all(|&p| p == BLUE_BG.xrgb8888()));
        assert!(f[4..12].iter().all(|&p| p == RED));
        assert!(f[12..].iter().all(|&p| p == BLUE_BG.xrgb8888()));
    }

    #[test]
    fn center_does_not_scale() {
        let content = Content::Image { src: red(2, 2), bg: BLUE_BG };
        let f = render_frame(4, 4, &content, Mode::Center);
        let reds = f.iter().filter(|&&p| p == RED).count();
        assert_eq!(reds, 4);
        assert_eq!(f[5], RED);
        assert_eq!(f[0], BLUE_BG.xrgb8888());
    }

    #[test]
    fn transparent_pixels_show_background() {
        let mut src = red(2, 1);
        src.put_pixel(1, 0, Rgba([255, 0, 0, 0]));
        let content = Content::Image { src, bg: BLUE_BG };
        let f = render_frame(4, 1, &content, Mode::Tile);
        assert_eq!(f, vec![RED, BLUE_BG.xrgb8888(), RED, BLUE_BG.xrgb8888()]);
    }

    #[test]
    fn half_alpha_blends() {
        assert_eq!(over_bg([255, 255, 255, 0], Rgb::BLACK), 0);
        let mid = over_bg([255, 0, 0, 128], Rgb::BLACK);
        assert_eq!(mid >> 16, 128);
    }

    #[test]
    fn zero_sized_output_is_empty() {
        let content = Content::Image { src: red(2, 2), bg: BLUE_BG };
        assert!(render_frame(0, 5, &content, Mode::Fill).is_empty());
    }
}
