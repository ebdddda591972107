pub mod analytics;
pub mod arena;
pub mod config;
pub mod logging;
