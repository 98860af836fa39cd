// Author: Dustin Pilgrim
// License: MIT

mod desktop;
mod listener;
mod lock;
mod logging;
mod run;
mod state;
mod ui;
mod utils;

pub use desktop::{Desktop, DisplayState, StateView};
pub use listener::{ListenerConfig, bind, handle_client, serve};
pub use run::run_daemon;
pub use state::load_current;
pub use ui::{UiHandle, UiQueue, UiTask, channel};
