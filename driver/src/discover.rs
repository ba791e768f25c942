//! Item-list generation for `driver discover`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::core::wildcard::wildcard_regex;
use crate::io::init::DriverPaths;

/// Outcome of `driver discover`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverOutcome {
    pub output: PathBuf,
    pub items: Vec<String>,
}

/// Write the sorted names of regular files in `root` matching `pattern` to
/// `output`, one per line. The output file itself is never listed.
pub fn discover_items(root: &Path, pattern: &str, output: &Path) -> Result<DiscoverOutcome> {
    let matcher = wildcard_regex(pattern)?;
    let paths = DriverPaths::new(root);
    let output = paths.resolve(output);

    let mut items = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
        let entry = entry.context("read entry")?;
        if !entry.file_type().context("read file type")?.is_file() {
            continue;
        }
        if entry.path() == output {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if matcher.is_match(name) {
            items.push(name.to_string());
        }
    }
    items.sort();

    let mut contents = items.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    fs::write(&output, contents).with_context(|| format!("write {}", output.display()))?;
    info!(pattern, count = items.len(), output = %output.display(), "discovered items");
    Ok(DiscoverOutcome { output, items })
}
