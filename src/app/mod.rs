//! Application-Layer: Verdrahtung und Session-Zustands-Controller.

pub mod state_controller;
pub mod toolbox;

pub use state_controller::{AnimationManagerStateController, TimeManagerStateController};
pub use toolbox::Toolbox;
