//! Run logging helpers for `.driver/runs/<base>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{ItemFailure, ItemStatus};
use crate::io::init::DriverPaths;
use crate::io::tools::ToolOutput;

#[derive(Debug, Clone, Serialize)]
pub struct ItemMeta {
    pub counter: u32,
    pub item: String,
    pub status: ItemStatus,
    pub failure: Option<ItemFailure>,
    pub derived_path: Option<String>,
    pub filter_output: Option<String>,
    pub filter_matched: Option<bool>,
    pub result_file: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ItemLogPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub tools_log_path: PathBuf,
}

impl ItemLogPaths {
    pub fn new(paths: &DriverPaths, base: &str, counter: u32) -> Self {
        let dir = paths.run_dir(base).join(counter.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            tools_log_path: dir.join("tools.log"),
            dir,
        }
    }
}

/// Captured output of every tool an item invoked, in call order.
#[derive(Debug, Clone, Default)]
pub struct ToolLog {
    buf: String,
}

impl ToolLog {
    pub fn record(&mut self, tool: &str, output: &ToolOutput) {
        let status = match (output.timed_out, output.exit_code) {
            (true, _) => "timed out".to_string(),
            (false, Some(code)) => format!("exit {code}"),
            (false, None) => "signal".to_string(),
        };
        self.buf.push_str(&format!("=== {tool} ({status}) ===\n"));
        self.buf.push_str("--- stdout ---\n");
        self.buf.push_str(&output.stdout);
        self.buf.push_str("\n--- stderr ---\n");
        self.buf.push_str(&output.stderr);
        self.buf.push('\n');
    }

    pub fn note(&mut self, tool: &str, message: &str) {
        self.buf.push_str(&format!("=== {tool} ===\n{message}\n"));
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Write `meta.json` (and `tools.log` when anything ran) for one item.
pub fn write_item_log(
    paths: &DriverPaths,
    base: &str,
    meta: &ItemMeta,
    tools: &ToolLog,
) -> Result<ItemLogPaths> {
    let log_paths = ItemLogPaths::new(paths, base, meta.counter);
    fs::create_dir_all(&log_paths.dir)
        .with_context(|| format!("create item log dir {}", log_paths.dir.display()))?;
    write_json(&log_paths.meta_path, meta)?;
    if !tools.is_empty() {
        write_text(&log_paths.tools_log_path, tools.as_str())?;
    }
    Ok(log_paths)
}

/// Write a batch-level tool log (e.g. `merge.log`) into the run directory.
pub fn write_run_log(
    paths: &DriverPaths,
    base: &str,
    file_name: &str,
    log: &ToolLog,
) -> Result<PathBuf> {
    let dir = paths.run_dir(base);
    fs::create_dir_all(&dir).with_context(|| format!("create run dir {}", dir.display()))?;
    let path = dir.join(file_name);
    write_text(&path, log.as_str())?;
    Ok(path)
}

/// Summary of a whole batch, written once after merging.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub base: String,
    pub item_list: String,
    pub processed: u32,
    pub failed: u32,
    pub skipped: usize,
    pub stop: String,
    pub merged_inputs: Vec<String>,
    pub aggregate: Option<String>,
    /// Merge or relocation error that ended the run, if any.
    pub error: Option<String>,
    pub started_at: String,
    pub ended_at: String,
}

pub fn write_summary(paths: &DriverPaths, summary: &RunSummary) -> Result<PathBuf> {
    let dir = paths.run_dir(&summary.base);
    fs::create_dir_all(&dir).with_context(|| format!("create run dir {}", dir.display()))?;
    let path = dir.join("summary.json");
    write_json(&path, summary)?;
    Ok(path)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
