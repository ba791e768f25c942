//! Per-item rendered script files.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempPath;

/// A rendered script on disk. Removed on drop unless it was kept.
#[derive(Debug)]
pub struct ScriptFile {
    path: PathBuf,
    _cleanup: Option<TempPath>,
}

impl ScriptFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `contents` to a fresh, uniquely named script under `dir`.
///
/// Names look like `<prefix>XXXXXX.sh`; no two iterations ever share a file.
/// The file handle is closed before returning so the runner can open it.
pub fn write_script(dir: &Path, prefix: &str, contents: &str, keep: bool) -> Result<ScriptFile> {
    fs::create_dir_all(dir).with_context(|| format!("create script dir {}", dir.display()))?;
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".sh")
        .tempfile_in(dir)
        .with_context(|| format!("create script in {}", dir.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write script {}", file.path().display()))?;
    file.flush().context("flush script")?;

    let temp_path = file.into_temp_path();
    if keep {
        let path = temp_path.keep().context("keep rendered script")?;
        return Ok(ScriptFile {
            path,
            _cleanup: None,
        });
    }
    Ok(ScriptFile {
        path: temp_path.to_path_buf(),
        _cleanup: Some(temp_path),
    })
}
