mod report;

pub mod app;
pub mod config;
pub mod preflight;

pub use app::{exit_code, run};
