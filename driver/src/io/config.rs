//! Driver configuration stored in `driver.toml` at the run root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::limit::ItemLimit;
use crate::core::placeholders::{
    DEFAULT_DESTINATION_TOKEN, DEFAULT_SOURCE_TOKEN, DESTINATION_RULE, PlaceholderMap,
    PlaceholderRule, default_source_rule,
};
use crate::core::types::ItemMode;

/// Driver configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to the
/// values the analysis workflow has always used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// How item lines become working paths.
    pub mode: ItemMode,

    /// Run-script template, relative to the run root.
    pub template_path: PathBuf,

    /// Directory for rendered per-item scripts, relative to the run root.
    pub script_dir: PathBuf,

    /// Keep rendered scripts after the runner returns.
    pub keep_scripts: bool,

    /// Extension of per-item results and the aggregate (`root` → `out_1.root`).
    pub result_extension: String,

    /// Stop once the item counter exceeds this value.
    pub limit: u32,

    /// Ignore `limit` and process every item.
    pub unlimited: bool,

    /// Stop after the first item that fails.
    pub fail_fast: bool,

    /// Wall-clock budget for each external tool invocation.
    pub tool_timeout_secs: u64,

    /// Truncate captured tool stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Move the aggregate into this directory after merging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_dir: Option<PathBuf>,

    pub setup: SetupConfig,
    pub archive: ArchiveConfig,
    pub filter: FilterConfig,
    pub runner: ToolConfig,
    pub merge: ToolConfig,
    pub placeholders: PlaceholdersConfig,
}

/// Command run once before the first item (empty disables it).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SetupConfig {
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Extractor command; the item is appended (e.g. `["tar","-xzvf"]`).
    pub command: Vec<String>,
    /// File inside the extracted directory the batch works on.
    pub member: String,
    /// 0-based listing line whose first path segment names the extracted root.
    pub listing_line: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            command: vec!["tar".to_string(), "-xzvf".to_string()],
            member: "log.RAWtoALL".to_string(),
            listing_line: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilterConfig {
    /// Line pattern; filtering is skipped when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Filter command; pattern and input path are appended.
    pub command: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            pattern: None,
            command: vec!["grep".to_string(), "-i".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolConfig {
    pub command: Vec<String>,
}

impl ToolConfig {
    fn runner() -> Self {
        Self {
            command: vec!["bash".to_string()],
        }
    }

    fn merge() -> Self {
        Self {
            command: vec!["hadd".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlaceholdersConfig {
    pub source: PlaceholderConfig,
    pub destination: PlaceholderConfig,
}

impl Default for PlaceholdersConfig {
    fn default() -> Self {
        Self {
            source: PlaceholderConfig {
                token: DEFAULT_SOURCE_TOKEN.to_string(),
                value: None,
            },
            destination: PlaceholderConfig {
                token: DEFAULT_DESTINATION_TOKEN.to_string(),
                value: Some(DESTINATION_RULE.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub token: String,
    /// minijinja value rule; unset means the mode's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            mode: ItemMode::Token,
            template_path: PathBuf::from("RunRootMASTER.sh"),
            script_dir: PathBuf::from(".driver/scripts"),
            keep_scripts: false,
            result_extension: "root".to_string(),
            limit: 120,
            unlimited: false,
            fail_fast: false,
            tool_timeout_secs: 4 * 60 * 60,
            output_limit_bytes: 100_000,
            destination_dir: None,
            setup: SetupConfig::default(),
            archive: ArchiveConfig::default(),
            filter: FilterConfig::default(),
            runner: ToolConfig::runner(),
            merge: ToolConfig::merge(),
            placeholders: PlaceholdersConfig::default(),
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tool_timeout_secs == 0 {
            return Err(anyhow!("tool_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.template_path.as_os_str().is_empty() {
            return Err(anyhow!("template_path must be non-empty"));
        }
        require_command("runner.command", &self.runner.command)?;
        require_command("merge.command", &self.merge.command)?;
        if self.mode == ItemMode::Archive {
            require_command("archive.command", &self.archive.command)?;
            if self.archive.member.trim().is_empty() {
                return Err(anyhow!("archive.member must be non-empty"));
            }
        }
        if let Some(pattern) = &self.filter.pattern {
            if pattern.is_empty() {
                return Err(anyhow!("filter.pattern must be non-empty when set"));
            }
            require_command("filter.command", &self.filter.command)?;
        }
        self.placeholder_map()?
            .check(self.mode, self.filter_enabled())?;
        Ok(())
    }

    pub fn filter_enabled(&self) -> bool {
        self.filter.pattern.is_some()
    }

    pub fn item_limit(&self) -> ItemLimit {
        if self.unlimited {
            ItemLimit::unlimited()
        } else {
            ItemLimit::at(self.limit)
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Resolve placeholder tokens and value rules, applying mode defaults.
    pub fn placeholder_map(&self) -> Result<PlaceholderMap> {
        let source_rule = self
            .placeholders
            .source
            .value
            .clone()
            .unwrap_or_else(|| default_source_rule(self.mode, self.filter_enabled()).to_string());
        let destination_rule = self
            .placeholders
            .destination
            .value
            .clone()
            .unwrap_or_else(|| DESTINATION_RULE.to_string());
        PlaceholderMap::new(
            PlaceholderRule {
                token: self.placeholders.source.token.clone(),
                rule: source_rule,
            },
            PlaceholderRule {
                token: self.placeholders.destination.token.clone(),
                rule: destination_rule,
            },
        )
    }
}

fn require_command(field: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{field} must be a non-empty array"));
    }
    Ok(())
}

/// Command-line overrides layered on top of the file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub mode: Option<ItemMode>,
    pub template_path: Option<PathBuf>,
    pub pattern: Option<String>,
    pub limit: Option<u32>,
    pub unlimited: bool,
    pub destination_dir: Option<PathBuf>,
    pub fail_fast: bool,
    pub keep_scripts: bool,
}

/// Apply overrides to `base` and validate the result.
pub fn apply_overrides(mut base: DriverConfig, overrides: &ConfigOverrides) -> Result<DriverConfig> {
    if let Some(mode) = overrides.mode {
        base.mode = mode;
    }
    if let Some(template_path) = &overrides.template_path {
        base.template_path = template_path.clone();
    }
    if let Some(pattern) = &overrides.pattern {
        base.filter.pattern = Some(pattern.clone());
    }
    if let Some(limit) = overrides.limit {
        base.limit = limit;
        base.unlimited = false;
    }
    if overrides.unlimited {
        base.unlimited = true;
    }
    if let Some(destination_dir) = &overrides.destination_dir {
        base.destination_dir = Some(destination_dir.clone());
    }
    base.fail_fast |= overrides.fail_fast;
    base.keep_scripts |= overrides.keep_scripts;
    base.validate()?;
    Ok(base)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DriverConfig::default()`.
pub fn load_config(path: &Path) -> Result<DriverConfig> {
    if !path.exists() {
        let cfg = DriverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DriverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DriverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
