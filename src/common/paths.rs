use anyhow::{Context, Result};
use std::path::PathBuf;

/// Centralized path management for quizreel
/// Project files live next to `quizreel.toml`; only caches live here.

/// Get the quizreel cache directory
pub fn quizreel_cache_dir() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .context("Unable to determine user cache directory")?
        .join("quizreel");

    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("creating cache directory at {}", cache_dir.display()))?;

    Ok(cache_dir)
}

/// Get the narration audio cache directory
pub fn narration_cache_dir() -> Result<PathBuf> {
    let dir = quizreel_cache_dir()?.join("narration");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating narration cache directory at {}", dir.display()))?;
    Ok(dir)
}
