//! External toolchain abstraction.
//!
//! The [`Toolchain`] trait decouples the batch loop from the concrete external
//! programs (`tar`, `grep`, `bash`, `hadd` by default). Tests use a scripted
//! toolchain that records calls without spawning processes.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::io::config::DriverConfig;
use crate::io::process::{
    CommandOutput, command_from_argv, run_command_to_file, run_command_with_timeout,
};

/// Outcome of one external tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Successful exit with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Exit with `code` and the given stderr.
    pub fn exited(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Short human-readable reason for a non-successful invocation.
    pub fn describe_failure(&self, tool: &str) -> String {
        if self.timed_out {
            return format!("{tool} timed out");
        }
        let stderr = self.stderr.trim();
        let status = match self.exit_code {
            Some(code) => format!("{tool} exited with status {code}"),
            None => format!("{tool} was terminated by a signal"),
        };
        if stderr.is_empty() {
            status
        } else {
            format!("{status}: {}", last_line(stderr))
        }
    }
}

fn last_line(text: &str) -> &str {
    text.lines().last().unwrap_or(text)
}

impl From<CommandOutput> for ToolOutput {
    fn from(output: CommandOutput) -> Self {
        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.stdout_truncated > 0 {
            stdout.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                output.stdout_truncated
            ));
        }
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.stderr_truncated > 0 {
            stderr.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                output.stderr_truncated
            ));
        }
        Self {
            exit_code: output.status.code(),
            timed_out: output.timed_out,
            stdout,
            stderr,
        }
    }
}

/// Abstraction over the external programs a batch drives.
///
/// `Err` means the tool could not be invoked at all; a tool that ran and
/// failed is reported through [`ToolOutput`].
pub trait Toolchain {
    /// Run the one-time setup command, if one is configured.
    fn setup(&self, workdir: &Path) -> Result<Option<ToolOutput>>;
    /// Extract `archive`; stdout must carry the member listing.
    fn extract(&self, workdir: &Path, archive: &str) -> Result<ToolOutput>;
    /// Write the lines of `input` matching `pattern` into `output`.
    fn filter(&self, workdir: &Path, pattern: &str, input: &str, output: &Path)
    -> Result<ToolOutput>;
    /// Execute a rendered run-script.
    fn run_script(&self, workdir: &Path, script: &Path) -> Result<ToolOutput>;
    /// Combine `inputs` into `aggregate`.
    fn merge(&self, workdir: &Path, aggregate: &Path, inputs: &[PathBuf]) -> Result<ToolOutput>;
}

/// Toolchain that spawns the commands named in [`DriverConfig`].
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    setup: Vec<String>,
    extract: Vec<String>,
    filter: Vec<String>,
    runner: Vec<String>,
    merge: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandToolchain {
    pub fn from_config(cfg: &DriverConfig) -> Self {
        Self {
            setup: cfg.setup.command.clone(),
            extract: cfg.archive.command.clone(),
            filter: cfg.filter.command.clone(),
            runner: cfg.runner.command.clone(),
            merge: cfg.merge.command.clone(),
            timeout: cfg.tool_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn run(&self, cmd: Command) -> Result<ToolOutput> {
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)?;
        Ok(ToolOutput::from(output))
    }
}

impl Toolchain for CommandToolchain {
    #[instrument(skip_all)]
    fn setup(&self, workdir: &Path) -> Result<Option<ToolOutput>> {
        if self.setup.is_empty() {
            return Ok(None);
        }
        info!(command = ?self.setup, "running setup command");
        let cmd = command_from_argv(&self.setup, workdir)?;
        self.run(cmd).context("run setup command").map(Some)
    }

    #[instrument(skip_all, fields(archive = %archive))]
    fn extract(&self, workdir: &Path, archive: &str) -> Result<ToolOutput> {
        let mut cmd = command_from_argv(&self.extract, workdir)?;
        cmd.arg(archive);
        self.run(cmd).context("run extractor")
    }

    #[instrument(skip_all, fields(pattern = %pattern, input = %input))]
    fn filter(
        &self,
        workdir: &Path,
        pattern: &str,
        input: &str,
        output: &Path,
    ) -> Result<ToolOutput> {
        let mut cmd = command_from_argv(&self.filter, workdir)?;
        cmd.arg(pattern).arg(input);
        let result = run_command_to_file(cmd, output, self.timeout, self.output_limit_bytes)
            .context("run line filter")?;
        Ok(ToolOutput::from(result))
    }

    #[instrument(skip_all, fields(script = %script.display()))]
    fn run_script(&self, workdir: &Path, script: &Path) -> Result<ToolOutput> {
        let mut cmd = command_from_argv(&self.runner, workdir)?;
        cmd.arg(script);
        let output = self.run(cmd).context("run script runner")?;
        if !output.success() {
            warn!(exit_code = ?output.exit_code, timed_out = output.timed_out, "runner failed");
        }
        Ok(output)
    }

    #[instrument(skip_all, fields(aggregate = %aggregate.display(), inputs = inputs.len()))]
    fn merge(&self, workdir: &Path, aggregate: &Path, inputs: &[PathBuf]) -> Result<ToolOutput> {
        let mut cmd = command_from_argv(&self.merge, workdir)?;
        cmd.arg(aggregate).args(inputs);
        debug!("merging results");
        self.run(cmd).context("run merge tool")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolchain(runner: &[&str], merge: &[&str]) -> CommandToolchain {
        let mut cfg = DriverConfig::default();
        cfg.runner.command = runner.iter().map(|s| s.to_string()).collect();
        cfg.merge.command = merge.iter().map(|s| s.to_string()).collect();
        cfg.tool_timeout_secs = 10;
        CommandToolchain::from_config(&cfg)
    }

    #[test]
    fn describe_failure_prefers_last_stderr_line() {
        let output = ToolOutput::exited(2, "warning\nfatal: no such file\n");
        assert_eq!(
            output.describe_failure("grep"),
            "grep exited with status 2: fatal: no such file"
        );
        let timed_out = ToolOutput {
            timed_out: true,
            ..ToolOutput::default()
        };
        assert_eq!(timed_out.describe_failure("bash"), "bash timed out");
    }

    #[test]
    fn setup_is_skipped_when_unconfigured() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tools = toolchain(&["bash"], &["hadd"]);
        assert!(tools.setup(temp.path()).expect("setup").is_none());
    }

    #[test]
    fn runs_script_with_configured_runner() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("job.sh");
        std::fs::write(&script, "echo from-script\nexit 4\n").expect("write script");
        let tools = toolchain(&["sh"], &["hadd"]);
        let output = tools.run_script(temp.path(), &script).expect("run");
        assert_eq!(output.stdout, "from-script\n");
        assert_eq!(output.exit_code, Some(4));
        assert!(!output.success());
    }

    #[test]
    fn merge_passes_aggregate_before_inputs() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("out_1.root"), "one\n").expect("write");
        std::fs::write(temp.path().join("out_2.root"), "two\n").expect("write");
        let tools = toolchain(&["bash"], &["sh", "-c", "cat \"$@\" > \"$0\""]);
        let output = tools
            .merge(
                temp.path(),
                Path::new("out_All.root"),
                &[PathBuf::from("out_1.root"), PathBuf::from("out_2.root")],
            )
            .expect("merge");
        assert!(output.success());
        let merged = std::fs::read_to_string(temp.path().join("out_All.root")).expect("read");
        assert_eq!(merged, "one\ntwo\n");
    }
}
