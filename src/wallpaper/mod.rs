// Author: Dustin Pilgrim
// License: MIT

pub mod render;
pub mod resolve;
pub mod surface;
pub mod wayland;

pub use render::Mode;
pub use resolve::Resolver;
pub use surface::{NullSurface, Surface};
pub use wayland::Screen;
