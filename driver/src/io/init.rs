//! Canonical paths under the run root and `driver init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{DriverConfig, write_config};

pub const CONFIG_FILE: &str = "driver.toml";

/// All canonical driver-owned paths for a run root.
#[derive(Debug, Clone)]
pub struct DriverPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl DriverPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".driver");
        Self {
            root: root.clone(),
            runs_dir: state_dir.join("runs"),
            gitignore_path: state_dir.join(".gitignore"),
            state_dir,
            config_path: root.join(CONFIG_FILE),
        }
    }

    /// Run-log directory for one output base name.
    pub fn run_dir(&self, base: &str) -> PathBuf {
        self.runs_dir.join(base)
    }

    /// Resolve a configured path against the run root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing `driver.toml`.
    pub force: bool,
}

/// What `init_workspace` wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub config_path: PathBuf,
    /// Set when a starter template was created.
    pub template_path: Option<PathBuf>,
}

/// Write a default `driver.toml` and a starter template into `root`.
///
/// Fails if `driver.toml` already exists unless `options.force` is set. An
/// existing template is never overwritten.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<InitOutcome> {
    let paths = DriverPaths::new(root);
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "driver init: {} already exists (use --force to overwrite)",
            CONFIG_FILE
        ));
    }

    let cfg = DriverConfig::default();
    write_config(&paths.config_path, &cfg)?;

    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create directory {}", paths.state_dir.display()))?;
    fs::write(&paths.gitignore_path, STATE_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;

    let template_path = paths.resolve(&cfg.template_path);
    let created_template = if template_path.exists() {
        None
    } else {
        fs::write(&template_path, starter_template(&cfg))
            .with_context(|| format!("write file {}", template_path.display()))?;
        Some(template_path)
    };

    Ok(InitOutcome {
        config_path: paths.config_path,
        template_path: created_template,
    })
}

fn starter_template(cfg: &DriverConfig) -> String {
    format!(
        "#!/bin/bash\nroot -l -b -q 'MakeTree.C(\"{}\",\"{}\")'\n",
        cfg.placeholders.source.token, cfg.placeholders.destination.token
    )
}

const STATE_GITIGNORE: &str = "*\n";
