//! User interface rendering and input handling.
//!
//! - **renderer**: Scrollback view (the session's presentation sink) and
//!   its crossterm renderer
//! - **keymapper**: Keyboard input to console action mapping

pub mod keymapper;
pub mod renderer;

pub use keymapper::{InputAction, KeyMapper};
pub use renderer::{ConsoleView, Renderer, StatusInfo};
