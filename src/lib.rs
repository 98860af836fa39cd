// Author: Dustin Pilgrim
// License: MIT

pub mod backdrop;
pub mod cli;
pub mod daemon;
pub mod logrotate;
pub mod path;
pub mod protocol;
pub mod session;
pub mod wallpaper;
