// Library modules
pub mod cell;
pub mod client;
pub mod clipboard;
pub mod codec;
pub mod config;
pub mod error;
pub mod grid;
pub mod ipc;
pub mod keymap;
pub mod multiplexer;
pub mod page;
pub mod pane;
pub mod registry;
pub mod spawn;
pub mod transport;
pub mod vt;

pub use config::RuntimeConfig;
pub use pane::{Pane, PaneOptions};
pub use registry::Session;
