//! Path utilities for Taskloom directory resolution.

use anyhow::Result;
use std::path::PathBuf;

const TASKLOOM_DIR: &str = ".taskloom";
const TRACKER_FILE: &str = "processed_executions.redb";

/// Environment variable to override the Taskloom directory.
const TASKLOOM_DIR_ENV: &str = "TASKLOOM_DIR";

/// Resolve the Taskloom data directory.
/// Priority: TASKLOOM_DIR env var > ~/.taskloom/
pub fn resolve_taskloom_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(TASKLOOM_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|h| h.join(TASKLOOM_DIR))
        .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))
}

/// Ensure the Taskloom directory exists and return its path.
pub fn ensure_taskloom_dir() -> Result<PathBuf> {
    let dir = resolve_taskloom_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Default tracker database path: ~/.taskloom/processed_executions.redb
pub fn default_tracker_path() -> Result<PathBuf> {
    Ok(resolve_taskloom_dir()?.join(TRACKER_FILE))
}
