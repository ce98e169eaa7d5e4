pub mod config;
pub mod env;
pub mod hashing;
pub mod logging;
pub mod progress_config;
