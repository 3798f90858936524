use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Move `from` to `to`, falling back to copy + remove across filesystems.
///
/// Callers observe either the old location or the new one, never both.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::CrossesDevices => {}
        Err(err) => {
            return Err(err).with_context(|| {
                format!("Failed to move {} to {}", from.display(), to.display())
            });
        }
    }

    // Stage next to the destination so the final step is still a rename
    let staging = to.with_extension("partial");
    let copied = fs::copy(from, &staging)
        .and_then(|_| fs::File::open(&staging)?.sync_all())
        .and_then(|_| fs::rename(&staging, to));
    if let Err(err) = copied {
        let _ = fs::remove_file(&staging);
        return Err(err).with_context(|| {
            format!("Failed to copy {} to {}", from.display(), to.display())
        });
    }

    fs::remove_file(from)
        .with_context(|| format!("Moved {} but could not remove the original", from.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn moves_into_new_directory() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("video_1.mp4");
        let to = dir.path().join("subidos").join("video_1.mp4");
        fs::write(&from, b"mp4").unwrap();

        move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"mp4");
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempdir().unwrap();
        let err = move_file(&dir.path().join("nope.mp4"), &dir.path().join("x.mp4"));
        assert!(err.is_err());
    }
}
