pub mod clipboard;
pub mod command;
pub mod logging;
pub mod panel_state;
pub mod render;
pub mod session;
pub mod transport;
