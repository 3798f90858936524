use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

pub fn probe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .with_context(|| format!("Failed to run ffprobe for {}", path.display()))?;

    if !output.status.success() {
        anyhow::bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("ffprobe returned no usable duration for {}", path.display()))
}

fn parse_duration(stdout: &str) -> Result<f64> {
    let duration: f64 = stdout
        .trim()
        .parse()
        .context("Failed to parse ffprobe duration as f64")?;
    if !duration.is_finite() || duration <= 0.0 {
        anyhow::bail!("duration {duration} is not positive");
    }
    Ok(duration)
}
