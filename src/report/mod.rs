//! Output rendering for answers and history.

pub mod render;

pub use render::{render_cleared, render_history, render_response};
