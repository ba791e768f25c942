//! Moving the aggregate output to its final destination.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Move `file` into `dest_dir`, keeping its file name. Returns the new path.
///
/// The directory is created if needed. An existing file with the same name is
/// replaced. Falls back to copy + remove when a rename crosses filesystems.
pub fn move_into(file: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .ok_or_else(|| anyhow!("cannot relocate {}: no file name", file.display()))?;
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("create destination {}", dest_dir.display()))?;
    let target = dest_dir.join(name);

    match fs::rename(file, &target) {
        Ok(()) => Ok(target),
        Err(err) => {
            debug!(err = %err, "rename failed, copying instead");
            fs::copy(file, &target).with_context(|| {
                format!("copy {} to {}", file.display(), target.display())
            })?;
            fs::remove_file(file).with_context(|| format!("remove {}", file.display()))?;
            Ok(target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_file_into_new_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("out_All.root");
        fs::write(&file, "merged").expect("write");
        let dest = temp.path().join("final/results");

        let moved = move_into(&file, &dest).expect("move");

        assert_eq!(moved, dest.join("out_All.root"));
        assert!(!file.exists());
        assert_eq!(fs::read_to_string(moved).expect("read"), "merged");
    }

    #[test]
    fn replaces_existing_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&dest).expect("mkdir");
        fs::write(dest.join("out_All.root"), "old").expect("write old");
        let file = temp.path().join("out_All.root");
        fs::write(&file, "new").expect("write new");

        let moved = move_into(&file, &dest).expect("move");
        assert_eq!(fs::read_to_string(moved).expect("read"), "new");
    }

    #[test]
    fn missing_source_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(move_into(&temp.path().join("absent.root"), temp.path()).is_err());
    }
}
