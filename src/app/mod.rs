//! Application state modules

pub mod state;

pub use state::AppState;
