//! Test-only helpers: a scripted toolchain and a throwaway run root.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::ItemMode;
use crate::io::config::DriverConfig;
use crate::io::tools::{ToolOutput, Toolchain};

/// Template understood by [`ScriptedToolchain`]: it "produces" the result file
/// named on the `touch` line and records the source value.
pub const TOUCH_TEMPLATE: &str = "#!/bin/bash\n# source: XXXX\ntouch YYYY\n";

/// One recorded toolchain call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Setup,
    Extract {
        archive: String,
    },
    Filter {
        pattern: String,
        input: String,
        output: PathBuf,
    },
    Run {
        script: PathBuf,
        contents: String,
    },
    Merge {
        aggregate: PathBuf,
        inputs: Vec<PathBuf>,
    },
}

/// Toolchain that simulates the external programs without spawning them.
///
/// - `extract` prints a listing rooted at the archive stem (`a.tgz` → `a/`),
///   unless overridden per archive.
/// - `filter` writes one line naming its input into the output file.
/// - `run_script` creates every file named on a `touch <file>` line and fails
///   with status 1 if the script contains `exit 1`.
/// - `merge` concatenates the inputs into the aggregate.
#[derive(Debug, Default)]
pub struct ScriptedToolchain {
    calls: RefCell<Vec<ToolCall>>,
    listings: HashMap<String, String>,
    failing_archives: HashSet<String>,
    filter_exit: Option<i32>,
    filter_timeout: bool,
    merge_exit: Option<i32>,
    setup: Option<ToolOutput>,
}

impl ScriptedToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `listing` as extractor stdout for `archive`.
    pub fn with_listing(mut self, archive: &str, listing: &str) -> Self {
        self.listings
            .insert(archive.to_string(), listing.to_string());
        self
    }

    /// Make the extractor exit with status 2 for `archive`.
    pub fn with_failing_archive(mut self, archive: &str) -> Self {
        self.failing_archives.insert(archive.to_string());
        self
    }

    /// Exit status the filter reports (default 0).
    pub fn with_filter_exit(mut self, code: i32) -> Self {
        self.filter_exit = Some(code);
        self
    }

    /// Make the filter report a timeout.
    pub fn with_filter_timeout(mut self) -> Self {
        self.filter_timeout = true;
        self
    }

    pub fn with_merge_exit(mut self, code: i32) -> Self {
        self.merge_exit = Some(code);
        self
    }

    pub fn with_setup(mut self, output: ToolOutput) -> Self {
        self.setup = Some(output);
        self
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.borrow().clone()
    }

    /// Rendered script contents, in run order.
    pub fn scripts(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                ToolCall::Run { contents, .. } => Some(contents.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn merges(&self) -> Vec<(PathBuf, Vec<PathBuf>)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                ToolCall::Merge { aggregate, inputs } => Some((aggregate.clone(), inputs.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ToolCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Toolchain for ScriptedToolchain {
    fn setup(&self, _workdir: &Path) -> Result<Option<ToolOutput>> {
        if self.setup.is_some() {
            self.record(ToolCall::Setup);
        }
        Ok(self.setup.clone())
    }

    fn extract(&self, _workdir: &Path, archive: &str) -> Result<ToolOutput> {
        self.record(ToolCall::Extract {
            archive: archive.to_string(),
        });
        if self.failing_archives.contains(archive) {
            return Ok(ToolOutput::exited(2, "tar: Error is not recoverable"));
        }
        let listing = match self.listings.get(archive) {
            Some(listing) => listing.clone(),
            None => {
                let stem = archive.split('.').next().unwrap_or(archive);
                format!("{stem}/\n{stem}/log.RAWtoALL\n")
            }
        };
        Ok(ToolOutput::ok(listing))
    }

    fn filter(
        &self,
        _workdir: &Path,
        pattern: &str,
        input: &str,
        output: &Path,
    ) -> Result<ToolOutput> {
        self.record(ToolCall::Filter {
            pattern: pattern.to_string(),
            input: input.to_string(),
            output: output.to_path_buf(),
        });
        if self.filter_timeout {
            fs::write(output, "").with_context(|| format!("write {}", output.display()))?;
            return Ok(ToolOutput {
                exit_code: None,
                timed_out: true,
                ..ToolOutput::default()
            });
        }
        let code = self.filter_exit.unwrap_or(0);
        let contents = if code == 0 {
            format!("{pattern} from {input}\n")
        } else {
            String::new()
        };
        fs::write(output, contents).with_context(|| format!("write {}", output.display()))?;
        Ok(ToolOutput::exited(code, ""))
    }

    fn run_script(&self, workdir: &Path, script: &Path) -> Result<ToolOutput> {
        let contents = fs::read_to_string(script)
            .with_context(|| format!("read script {}", script.display()))?;
        self.record(ToolCall::Run {
            script: script.to_path_buf(),
            contents: contents.clone(),
        });
        if contents.lines().any(|line| line.trim() == "exit 1") {
            return Ok(ToolOutput::exited(1, "script failed"));
        }
        for line in contents.lines() {
            if let Some(target) = line.trim().strip_prefix("touch ") {
                fs::write(workdir.join(target.trim()), format!("{target}\n"))
                    .with_context(|| format!("touch {target}"))?;
            }
        }
        Ok(ToolOutput::ok(""))
    }

    fn merge(&self, workdir: &Path, aggregate: &Path, inputs: &[PathBuf]) -> Result<ToolOutput> {
        self.record(ToolCall::Merge {
            aggregate: aggregate.to_path_buf(),
            inputs: inputs.to_vec(),
        });
        if let Some(code) = self.merge_exit.filter(|code| *code != 0) {
            return Ok(ToolOutput::exited(code, "merge failed"));
        }
        let mut merged = String::new();
        for input in inputs {
            merged.push_str(
                &fs::read_to_string(workdir.join(input))
                    .with_context(|| format!("read {}", input.display()))?,
            );
        }
        fs::write(workdir.join(aggregate), merged)
            .with_context(|| format!("write {}", aggregate.display()))?;
        Ok(ToolOutput::ok(""))
    }
}

/// Temporary run root with a template and an item list.
pub struct TestRoot {
    dir: TempDir,
}

impl TestRoot {
    /// Create a run root containing `RunRootMASTER.sh` = [`TOUCH_TEMPLATE`].
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let root = Self { dir };
        root.write("RunRootMASTER.sh", TOUCH_TEMPLATE)?;
        Ok(root)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Write `items` one per line to `items.txt`.
    pub fn write_items(&self, items: &[&str]) -> Result<PathBuf> {
        let mut contents = items.join("\n");
        contents.push('\n');
        self.write("items.txt", &contents)
    }

    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.dir.path().join(name);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Parse an item's `meta.json` from the run log.
    pub fn item_meta(&self, base: &str, counter: u32) -> Result<serde_json::Value> {
        let raw = self.read(&format!(".driver/runs/{base}/{counter}/meta.json"))?;
        serde_json::from_str(&raw).map_err(|err| anyhow!("parse meta.json: {err}"))
    }
}

/// Default config (token mode).
pub fn token_config() -> DriverConfig {
    DriverConfig::default()
}

/// Archive-mode config filtering on `pattern`.
pub fn archive_config(pattern: &str) -> DriverConfig {
    let mut cfg = DriverConfig {
        mode: ItemMode::Archive,
        ..DriverConfig::default()
    };
    cfg.filter.pattern = Some(pattern.to_string());
    cfg
}
