//! CLI command implementations

pub mod context;
pub mod run;
pub mod show;
pub mod style;

pub use run::{run_engine, run_once, run_recover};
pub use show::show_config;
