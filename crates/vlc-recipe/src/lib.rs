pub mod build;
pub mod config;
pub mod error;
pub mod executor;
pub mod log_sanitize;
pub mod modules;
pub mod package;
pub mod planner;
pub mod recipe;
pub mod settings;
pub mod source;
pub mod system;
pub mod workspace;

pub use error::{Error, Result};
