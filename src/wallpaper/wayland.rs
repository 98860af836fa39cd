// Author: Dustin Pilgrim
// License: MIT

use std::fs::File;
use std::os::fd::{AsFd, AsRawFd};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use eventline as el;
use image::RgbaImage;
use memmap2::MmapMut;
use tempfile::tempfile;

use wayland_client::{
    Connection, Dispatch, EventQueue, QueueHandle,
    globals::{GlobalListContents, registry_queue_init},
    protocol::{
        wl_buffer::{self, WlBuffer},
        wl_compositor::WlCompositor,
        wl_output::{self, WlOutput},
        wl_region::WlRegion,
        wl_registry,
        wl_shm::{self, WlShm},
        wl_shm_pool::WlShmPool,
        wl_surface::WlSurface,
    },
};

use wayland_protocols_wlr::layer_shell::v1::client::{
    zwlr_layer_shell_v1::{Layer, ZwlrLayerShellV1},
    zwlr_layer_surface_v1::{Anchor, KeyboardInteractivity, ZwlrLayerSurfaceV1},
};

use crate::backdrop::{Backdrop, Rgb};
use crate::wallpaper::render::{Content, Mode, render_frame};
use crate::wallpaper::surface::Surface;

const LAYER_NAMESPACE: &str = "kereta";

#[derive(Default)]
struct ShmBuf {
    _file: Option<File>,
    mmap: Option<MmapMut>,
    _pool: Option<WlShmPool>,
    buffer: Option<WlBuffer>,
    busy: bool,
}

impl ShmBuf {
    fn is_ready(&self) -> bool {
        self.buffer.is_some() && self.mmap.is_some()
    }
}

/// Two shm buffers per output; we only ever paint the one the compositor released.
#[derive(Default)]
struct DoubleBuffer {
    slots: [ShmBuf; 2],
    current: usize,
}

impl DoubleBuffer {
    fn current(&self) -> &ShmBuf {
        &self.slots[self.current]
    }

    fn current_mut(&mut self) -> &mut ShmBuf {
        &mut self.slots[self.current]
    }

    fn both_ready(&self) -> bool {
        self.slots.iter().all(ShmBuf::is_ready)
    }

    fn current_is_busy(&self) -> bool {
        self.current().busy
    }

    fn swap_to_free(&mut self) {
        let other = 1 - self.current;
        if !self.slots[other].busy {
            self.current = other;
        }
    }

    fn mark_free(&mut self, which: usize) {
        if let Some(slot) = self.slots.get_mut(which) {
            slot.busy = false;
        }
    }
}

struct OutputInfo {
    wl: WlOutput,
    name: Option<String>,
    description: Option<String>,
}

/// One full-screen background layer surface per output.
struct OutputSurface {
    output_name: Option<String>,
    surface: WlSurface,
    layer: ZwlrLayerSurfaceV1,

    alive: bool,
    configured: bool,
    width: u32,
    height: u32,

    stride: i32,
    size_bytes: usize,
    buffers: DoubleBuffer,

    // Set on (re)configure; cleared once the current content is painted.
    needs_paint: bool,
}

impl OutputSurface {
    fn usable(&self) -> bool {
        self.alive && self.configured && self.width != 0 && self.height != 0
    }

    fn name(&self) -> &str {
        self.output_name.as_deref().unwrap_or("(unknown)")
    }
}

/// The desktop window: borderless, unfocusable, below everything, full screen.
pub struct Screen {
    conn: Connection,
    event_queue: Option<EventQueue<Screen>>,
    qh: QueueHandle<Screen>,

    compositor: Option<WlCompositor>,
    shm: Option<WlShm>,
    layer_shell: Option<ZwlrLayerShellV1>,

    outputs: Vec<OutputInfo>,
    surfaces: Vec<OutputSurface>,

    mode: Mode,
    background: Rgb,
    content: Option<Content>,
}

impl Screen {
    pub fn connect(mode: Mode, background: Rgb) -> Result<Screen> {
        if std::env::var_os("WAYLAND_DISPLAY").is_none() {
            bail!("Wayland-only: WAYLAND_DISPLAY is unset");
        }

        let conn = Connection::connect_to_env().context("connect_to_env")?;
        let (globals, event_queue) =
            registry_queue_init::<Screen>(&conn).context("registry_queue_init")?;
        let qh = event_queue.handle();

        let compositor = globals.bind::<WlCompositor, _, _>(&qh, 1..=6, ()).ok();
        let shm = globals.bind::<WlShm, _, _>(&qh, 1..=1, ()).ok();
        let layer_shell = globals.bind::<ZwlrLayerShellV1, _, _>(&qh, 1..=1, ()).ok();

        let mut outputs = Vec::new();
        for g in globals.contents().clone_list() {
            if g.interface == "wl_output" {
                let idx = outputs.len();
                let out: WlOutput = globals.registry().bind(g.name, g.version.min(4), &qh, idx);
                outputs.push(OutputInfo {
                    wl: out,
                    name: None,
                    description: None,
                });
            }
        }

        el::info!(
            "wayland.connect compositor={compositor} shm={shm} layer_shell={layer_shell} outputs={outputs}",
            compositor = compositor.is_some(),
            shm = shm.is_some(),
            layer_shell = layer_shell.is_some(),
            outputs = outputs.len()
        );

        let mut screen = Screen {
            conn,
            event_queue: Some(event_queue),
            qh,
            compositor,
            shm,
            layer_shell,
            outputs,
            surfaces: Vec::new(),
            mode,
            background,
            content: None,
        };

        // Pick up wl_output names before surfaces are created.
        for i in 0..2 {
            if let Err(e) = screen.roundtrip() {
                el::warn!("initial roundtrip failed attempt={} err={:#}", i, e);
            }
        }

        Ok(screen)
    }

    // The queue is taken out while dispatching; put it back even on error.
    fn roundtrip(&mut self) -> Result<()> {
        let mut q = self.event_queue.take().context("event_queue missing")?;
        let res = q.roundtrip(self).context("wayland roundtrip");
        self.event_queue = Some(q);
        res.map(|_| ())
    }

    fn blocking_dispatch(&mut self) -> Result<()> {
        let mut q = self.event_queue.take().context("event_queue missing")?;
        let res = q.blocking_dispatch(self).context("blocking_dispatch");
        self.event_queue = Some(q);
        res.map(|_| ())
    }

    fn dispatch_pending(&mut self) -> Result<()> {
        let mut q = self.event_queue.take().context("event_queue missing")?;
        let res = q.dispatch_pending(self).context("dispatch_pending");
        self.event_queue = Some(q);
        res.map(|_| ())
    }

    fn poll_readable(&self, timeout: Duration) -> Result<bool> {
        let fd = self.conn.backend().poll_fd().as_raw_fd();

        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };

        let timeout_ms: i32 = timeout.as_millis().min(i32::MAX as u128) as i32;

        let rc = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout_ms) };
        if rc < 0 {
            let e = std::io::Error::last_os_error();
            if e.kind() == std::io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(e).context("poll wayland fd");
        }

        Ok(rc > 0 && (pfd.revents & libc::POLLIN) != 0)
    }

    /// Dispatch only when readable, and never block longer than `timeout`.
    fn dispatch_with_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.conn.flush().context("flush")?;
        if self.poll_readable(timeout)? {
            self.blocking_dispatch()?;
        }
        self.dispatch_pending()
    }

    fn ensure_surfaces(&mut self) -> Result<()> {
        if !self.surfaces.is_empty() {
            return Ok(());
        }

        let compositor = self
            .compositor
            .as_ref()
            .context("wl_compositor missing")?
            .clone();

        let layer_shell = self
            .layer_shell
            .as_ref()
            .context("zwlr_layer_shell_v1 missing (need layer-shell capable compositor)")?
            .clone();

        el::info!("wayland.ensure_surfaces creating count={}", self.outputs.len());

        for oi in &self.outputs {
            let output_name = oi.name.clone().or_else(|| oi.description.clone());
            let (surface, layer) = create_layer_surface(&compositor, &layer_shell, &self.qh, &oi.wl);

            self.surfaces.push(OutputSurface {
                output_name,
                surface,
                layer,
                alive: true,
                configured: false,
                width: 0,
                height: 0,
                stride: 0,
                size_bytes: 0,
                buffers: DoubleBuffer::default(),
                needs_paint: false,
            });
        }

        Ok(())
    }

    fn wait_for_configured(&mut self) -> Result<()> {
        let start = Instant::now();

        for attempt in 0..10u64 {
            self.roundtrip()?;

            let mut alive = self.surfaces.iter().filter(|s| s.alive).peekable();
            if alive.peek().is_none() {
                return Ok(());
            }
            if alive.all(OutputSurface::usable) {
                el::debug!(
                    "wayland.wait_for_configured ok elapsed_ms={ms}",
                    ms = start.elapsed().as_millis() as i64
                );
                return Ok(());
            }

            std::thread::sleep(Duration::from_millis((20 + attempt * 5).min(100)));
        }

        if !self.surfaces.iter().any(OutputSurface::usable) {
            bail!("no layer surface configured after waiting");
        }

        el::warn!("wayland.wait_for_configured partial; painting configured outputs only");
        Ok(())
    }

    fn wait_for_free_buffer(&mut self, si: usize) -> Result<()> {
        const HARD_BAIL_AFTER: Duration = Duration::from_millis(1500);

        let start = Instant::now();
        loop {
            {
                let s = &mut self.surfaces[si];
                if s.buffers.current_is_busy() {
                    s.buffers.swap_to_free();
                }
                if !s.buffers.current_is_busy() {
                    return Ok(());
                }
            }

            if start.elapsed() >= HARD_BAIL_AFTER {
                // Painting over a held buffer may tear; a stuck compositor must not freeze the UI loop.
                el::warn!(
                    "wayland.wait_for_free_buffer hard_bail si={si} name={name}",
                    si = si as i64,
                    name = self.surfaces[si].name()
                );
                return Ok(());
            }

            self.dispatch_with_timeout(Duration::from_millis(16))?;
        }
    }

    /// Paint the current content on every usable output (or only those that
    /// need it when `only_pending` is set).
    fn repaint(&mut self, only_pending: bool) -> Result<usize> {
        if self.content.is_none() {
            return Ok(0);
        }

        let shm = self.shm.as_ref().context("wl_shm missing")?.clone();
        let qh = self.qh.clone();
        let mut painted = 0usize;

        for si in 0..self.surfaces.len() {
            if !self.surfaces[si].usable() || (only_pending && !self.surfaces[si].needs_paint) {
                continue;
            }

            ensure_buffers(&qh, &shm, si, &mut self.surfaces[si])?;
            self.wait_for_free_buffer(si)?;

            let (w, h) = (self.surfaces[si].width as usize, self.surfaces[si].height as usize);
            let Some(content) = self.content.as_ref() else { break };
            let frame = render_frame(w, h, content, self.mode);

            let s = &mut self.surfaces[si];
            paint_frame(s, &frame);
            commit(s);
            s.needs_paint = false;

            el::debug!(
                "wayland.painted si={si} name={name} size={w}x{h}",
                si = si as i64,
                name = s.name(),
                w = w as i64,
                h = h as i64
            );
            painted += 1;
        }

        if painted > 0 {
            self.conn.flush().context("flush")?;
        }
        Ok(painted)
    }
}

impl Surface for Screen {
    fn clear(&mut self) -> Result<()> {
        self.content = None;
        for s in &mut self.surfaces {
            s.needs_paint = false;
        }
        Ok(())
    }

    fn show(&mut self, backdrop: &Backdrop) -> Result<()> {
        el::scope!(
            "kereta.wayland.show",
            success = "shown",
            failure = "failed",
            aborted = "aborted",
            {
                let content = match backdrop {
                    Backdrop::Solid { colour } => Content::Solid(*colour),
                    Backdrop::Image { path } => Content::Image {
                        src: load_rgba(path)?,
                        bg: self.background,
                    },
                };

                self.ensure_surfaces()?;
                self.wait_for_configured()?;

                self.content = Some(content);
                let painted = self.repaint(false)?;

                el::info!(
                    "wayland.show backdrop={backdrop} outputs={painted}",
                    backdrop = backdrop.describe(),
                    painted = painted as i64
                );
                if painted == 0 {
                    el::warn!("no configured outputs yet; will paint on configure");
                }

                Ok::<(), anyhow::Error>(())
            }
        )
    }

    fn dispatch(&mut self, timeout: Duration) -> Result<()> {
        self.dispatch_with_timeout(timeout)?;

        if self.surfaces.iter().any(|s| s.needs_paint && s.usable()) {
            self.repaint(true)?;
        }
        Ok(())
    }
}

/* ---------- helpers ---------- */

fn load_rgba(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path).with_context(|| format!("decode image: {}", path.display()))?;
    let rgba = img.to_rgba8();

    el::info!(
        "loaded path={path} dimensions={w}x{h}",
        path = path.display().to_string(),
        w = rgba.width(),
        h = rgba.height()
    );

    Ok(rgba)
}

fn create_layer_surface(
    compositor: &WlCompositor,
    layer_shell: &ZwlrLayerShellV1,
    qh: &QueueHandle<Screen>,
    out: &WlOutput,
) -> (WlSurface, ZwlrLayerSurfaceV1) {
    let surface = compositor.create_surface(qh, ());

    // Clicks fall through to the compositor instead of landing on the desktop window.
    let empty_region = compositor.create_region(qh, ());
    surface.set_input_region(Some(&empty_region));

    let layer = layer_shell.get_layer_surface(
        &surface,
        Some(out),
        Layer::Background,
        LAYER_NAMESPACE.into(),
        qh,
        (),
    );

    layer.set_anchor(Anchor::Top | Anchor::Bottom | Anchor::Left | Anchor::Right);
    layer.set_size(0, 0);
    // Never reserve space; panels keep their own exclusive zones.
    layer.set_exclusive_zone(0);
    layer.set_keyboard_interactivity(KeyboardInteractivity::None);

    surface.commit();
    (surface, layer)
}

fn commit(s: &mut OutputSurface) {
    let Some(buf) = s.buffers.current().buffer.as_ref() else {
        el::warn!("wayland.commit missing_buffer name={}", s.name());
        return;
    };

    s.surface.attach(Some(buf), 0, 0);
    s.surface.damage_buffer(0, 0, s.width as i32, s.height as i32);
    s.surface.commit();

    s.buffers.current_mut().busy = true;
    s.buffers.swap_to_free();
}

fn paint_frame(s: &mut OutputSurface, frame: &[u32]) {
    let Some(mmap) = s.buffers.current_mut().mmap.as_mut() else { return };
    let len = mmap.len() / 4;
    let dst = unsafe { std::slice::from_raw_parts_mut(mmap.as_mut_ptr() as *mut u32, len) };
    let n = dst.len().min(frame.len());
    dst[..n].copy_from_slice(&frame[..n]);
}

fn ensure_buffers(
    qh: &QueueHandle<Screen>,
    shm: &WlShm,
    si: usize,
    s: &mut OutputSurface,
) -> Result<()> {
    let stride = (s.width as usize * 4) as i32;
    let size_bytes = (stride as usize) * s.height as usize;

    if s.buffers.both_ready() && s.size_bytes == size_bytes && s.stride == stride {
        return Ok(());
    }

    el::info!(
        "wayland.buffers.recreate si={si} w={w} h={h} bytes={bytes}",
        si = si as i64,
        w = s.width as i64,
        h = s.height as i64,
        bytes = size_bytes as i64
    );

    s.buffers = DoubleBuffer::default();
    for which in 0..2 {
        let slot = create_buffer(qh, shm, si, which, s.width, s.height, stride, size_bytes)?;
        s.buffers.slots[which] = slot;
    }

    s.stride = stride;
    s.size_bytes = size_bytes;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn create_buffer(
    qh: &QueueHandle<Screen>,
    shm: &WlShm,
    si: usize,
    which: usize,
    width: u32,
    height: u32,
    stride: i32,
    size_bytes: usize,
) -> Result<ShmBuf> {
    let file = tempfile().context("tempfile for shm")?;
    file.set_len(size_bytes as u64).context("set_len shm file")?;
    let mmap = unsafe { MmapMut::map_mut(&file).context("mmap shm")? };

    let pool = shm.create_pool(file.as_fd(), size_bytes as i32, qh, ());
    let buffer = pool.create_buffer(
        0,
        width as i32,
        height as i32,
        stride,
        wl_shm::Format::Xrgb8888,
        qh,
        (si, which),
    );

    Ok(ShmBuf {
        _file: Some(file),
        mmap: Some(mmap),
        _pool: Some(pool),
        buffer: Some(buffer),
        busy: false,
    })
}

/* ---------- Dispatch ---------- */

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for Screen {
    fn event(
        _state: &mut Screen,
        _proxy: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Screen>,
    ) {
    }
}

impl Dispatch<WlOutput, usize> for Screen {
    fn event(
        state: &mut Screen,
        _proxy: &WlOutput,
        event: wl_output::Event,
        data: &usize,
        _conn: &Connection,
        _qh: &QueueHandle<Screen>,
    ) {
        let Some(info) = state.outputs.get_mut(*data) else { return };

        match event {
            wl_output::Event::Name { name } => {
                el::debug!("wayland.output.name idx={} name={}", data, name);
                info.name = Some(name);
            }
            wl_output::Event::Description { description } => {
                info.description = Some(description);
            }
            _ => {}
        }
    }
}

impl Dispatch<ZwlrLayerSurfaceV1, ()> for Screen {
    fn event(
        state: &mut Screen,
        proxy: &ZwlrLayerSurfaceV1,
        event: <ZwlrLayerSurfaceV1 as wayland_client::Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Screen>,
    ) {
        use wayland_protocols_wlr::layer_shell::v1::client::zwlr_layer_surface_v1::Event as E;

        let Some(s) = state
            .surfaces
            .iter_mut()
            .find(|s| s.alive && s.layer == *proxy)
        else {
            return;
        };

        match event {
            E::Configure { serial, width, height } => {
                let resized = s.width != width || s.height != height;
                s.width = width;
                s.height = height;
                s.configured = true;
                s.needs_paint |= resized;

                el::info!(
                    "wayland.surface.configure name={name} w={w} h={h}",
                    name = s.name(),
                    w = width as i64,
                    h = height as i64
                );

                s.layer.ack_configure(serial);
                s.surface.commit();
            }
            E::Closed => {
                el::warn!("wayland.surface.closed name={}", s.name());
                s.alive = false;
                s.configured = false;
                s.needs_paint = false;
                s.layer.destroy();
                s.surface.destroy();
            }
            _ => {}
        }
    }
}

impl Dispatch<WlBuffer, (usize, usize)> for Screen {
    fn event(
        state: &mut Screen,
        _proxy: &WlBuffer,
        event: wl_buffer::Event,
        data: &(usize, usize),
        _conn: &Connection,
        _qh: &QueueHandle<Screen>,
    ) {
        if let wl_buffer::Event::Release = event {
            let (si, which) = *data;
            if let Some(s) = state.surfaces.get_mut(si) {
                s.buffers.mark_free(which);
            }
        }
    }
}

wayland_client::delegate_noop!(Screen: ignore WlCompositor);
wayland_client::delegate_noop!(Screen: ignore WlShm);
wayland_client::delegate_noop!(Screen: ignore ZwlrLayerShellV1);
wayland_client::delegate_noop!(Screen: ignore WlSurface);
wayland_client::delegate_noop!(Screen: ignore WlShmPool);
wayland_client::delegate_noop!(Screen: ignore WlRegion);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_buffer_swaps_only_to_free_slot() {
        let mut db = DoubleBuffer::default();
        assert!(!db.current_is_busy());

        db.current_mut().busy = true;
        db.swap_to_free();
        assert_eq!(db.current, 1);
        assert!(!db.current_is_busy());

        db.current_mut().busy = true;
        db.swap_to_free();
        // Both busy: stay put.
        assert_eq!(db.current, 1);

        db.mark_free(0);
        db.swap_to_free();
        assert_eq!(db.current, 0);
        assert!(!db.both_ready());
    }
}
