// src/utils/env.rs
use log::{info, warn};

/// Loads `.env` from the working directory, falling back to the parent
/// directory. Variables already present in the process environment win.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(_) => match dotenv::from_filename("../.env") {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) => warn!(
                "No .env file found ({}). Proceeding with system environment variables.",
                e
            ),
        },
    }
}
