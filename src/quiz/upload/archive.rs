use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use crate::quiz::support::files::move_file;
use crate::ui::prelude::{Level, emit};

/// Where `video` lands in `archive_dir`. An existing file with the same
/// name is kept; the new one gets the video id spliced into its name.
pub fn archive_destination(video: &Path, archive_dir: &Path, video_id: &str) -> Result<PathBuf> {
    let file_name = video
        .file_name()
        .with_context(|| format!("{} has no file name", video.display()))?;
    let target = archive_dir.join(file_name);
    if !target.exists() {
        return Ok(target);
    }

    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let renamed = match video.extension() {
        Some(ext) => format!("{stem}.{video_id}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{video_id}"),
    };
    let alternative = archive_dir.join(renamed);
    emit(
        Level::Warn,
        "upload.archive.collision",
        &format!(
            "{} already exists, archiving as {}",
            target.display(),
            alternative.display()
        ),
        None,
    );
    Ok(alternative)
}

/// Move an uploaded video into the archive and confirm it left the output dir.
pub fn archive_video(video: &Path, archive_dir: &Path, video_id: &str) -> Result<PathBuf> {
    let destination = archive_destination(video, archive_dir, video_id)?;
    move_file(video, &destination)?;

    if video.exists() || !destination.is_file() {
        bail!(
            "Archiving {} did not complete; check {}",
            video.display(),
            destination.display()
        );
    }
    Ok(destination)
}
