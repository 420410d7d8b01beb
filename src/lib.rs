//! Gatehouse command-line application.
//!
//! Exposes modules for integration testing

pub mod app;
pub mod cli;
pub mod config;
pub mod errors;

pub use app::Gatehouse;
pub use crate::config::{load_config, AppConfig, LoadedConfig, StoreProfile};
pub use errors::AppError;
