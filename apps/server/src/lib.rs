pub mod api;
pub mod config;
pub mod error;
mod main_lib;

pub use main_lib::{build_source, build_state, build_store, init_tracing, AppState};
