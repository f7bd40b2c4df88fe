//! Environment loading
//!
//! Priority order (highest to lowest):
//! 1. Variables already set in the environment
//! 2. Current directory .env
//! 3. ~/.builddash/.env

use std::path::PathBuf;

use anyhow::{Context, Result};
use builddash_server::Settings;
use tracing::{debug, info};

/// Get the builddash config directory path (~/.builddash)
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".builddash"))
}

/// Load .env files; dotenvy never overwrites variables that are already set.
pub fn load_dotenv() {
    let mut loaded_from = Vec::new();

    if let Ok(path) = dotenvy::dotenv() {
        loaded_from.push(path.display().to_string());
    }

    if let Some(env_file) = config_dir().map(|dir| dir.join(".env")) {
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => loaded_from.push(env_file.display().to_string()),
                Err(e) => debug!("Failed to load {}: {}", env_file.display(), e),
            }
        }
    }

    if loaded_from.is_empty() {
        info!("Using environment variables only (no .env file found)");
    } else {
        info!("Loaded configuration from: {}", loaded_from.join(", "));
    }
}

/// Load .env files and read settings; a missing variable is fatal.
pub fn load_settings() -> Result<Settings> {
    load_dotenv();
    Settings::from_env().context("Invalid configuration (see .env.example for required variables)")
}
