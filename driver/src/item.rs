//! Orchestration for a single batch item.
//!
//! Stages run in order: extract (archive mode), listing, filter (when a
//! pattern is set), render, run. A stage failure becomes an [`ItemFailure`]
//! recorded on the report; only driver-side I/O errors (template read, script
//! write, log write) are returned as `Err`.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, instrument, warn};

use crate::core::listing::{derived_path, extracted_root};
use crate::core::naming::OutputNames;
use crate::core::placeholders::{PlaceholderMap, ValueContext};
use crate::core::template::{Placeholder, render_template};
use crate::core::types::{ItemFailure, ItemMode, ItemStatus, Stage};
use crate::io::config::DriverConfig;
use crate::io::init::DriverPaths;
use crate::io::run_log::{ItemMeta, ToolLog, write_item_log};
use crate::io::script::write_script;
use crate::io::tools::Toolchain;

/// Everything an item needs that stays fixed for the whole batch.
pub struct ItemContext<'a> {
    pub paths: &'a DriverPaths,
    pub config: &'a DriverConfig,
    pub names: &'a OutputNames,
    pub placeholders: &'a PlaceholderMap,
    pub template_path: &'a Path,
    pub script_dir: &'a Path,
}

/// Result of processing one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// 1-based position among processed items.
    pub counter: u32,
    pub item: String,
    /// `<extracted root>/<member>` in archive mode.
    pub derived_path: Option<String>,
    /// Filter output file name, when a pattern is configured.
    pub filter_output: Option<String>,
    /// Whether the filter matched any line (`None` if it did not run cleanly).
    pub filter_matched: Option<bool>,
    /// Result file name substituted into the script.
    pub result_file: String,
    pub failure: Option<ItemFailure>,
}

impl ItemReport {
    pub fn status(&self) -> ItemStatus {
        if self.failure.is_some() {
            ItemStatus::Failed
        } else {
            ItemStatus::Ok
        }
    }
}

/// Process one item end to end and write its run log.
#[instrument(skip_all, fields(counter = counter, item = %item))]
pub fn process_item<T: Toolchain>(
    ctx: &ItemContext<'_>,
    counter: u32,
    item: &str,
    tools: &T,
) -> Result<ItemReport> {
    let started_at = Utc::now();
    let start = Instant::now();
    let mut report = ItemReport {
        counter,
        item: item.to_string(),
        derived_path: None,
        filter_output: None,
        filter_matched: None,
        result_file: ctx.names.result_file(counter),
        failure: None,
    };
    let mut log = ToolLog::default();

    if let Err(err) = run_stages(ctx, tools, &mut report, &mut log) {
        match err.downcast::<ItemFailure>() {
            Ok(failure) => {
                warn!(
                    stage = failure.stage.as_str(),
                    message = %failure.message,
                    "item failed"
                );
                log.note(failure.stage.as_str(), &failure.message);
                report.failure = Some(failure);
            }
            Err(err) => return Err(err.context(format!("process item {counter} ({item})"))),
        }
    }

    let meta = ItemMeta {
        counter,
        item: report.item.clone(),
        status: report.status(),
        failure: report.failure.clone(),
        derived_path: report.derived_path.clone(),
        filter_output: report.filter_output.clone(),
        filter_matched: report.filter_matched,
        result_file: report.result_file.clone(),
        started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ended_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    write_item_log(ctx.paths, ctx.names.base(), &meta, &log)?;
    Ok(report)
}

fn run_stages<T: Toolchain>(
    ctx: &ItemContext<'_>,
    tools: &T,
    report: &mut ItemReport,
    log: &mut ToolLog,
) -> Result<()> {
    let root = ctx.paths.root.as_path();

    let working = match ctx.config.mode {
        ItemMode::Token => report.item.clone(),
        ItemMode::Archive => {
            let output = tools
                .extract(root, &report.item)
                .map_err(|err| stage_error(Stage::Extract, &err))?;
            log.record("extract", &output);
            if !output.success() {
                return Err(
                    ItemFailure::new(Stage::Extract, output.describe_failure("extractor")).into(),
                );
            }
            let dir = extracted_root(&output.stdout, ctx.config.archive.listing_line)
                .map_err(|err| ItemFailure::new(Stage::Listing, err.to_string()))?;
            let derived = derived_path(&dir, &ctx.config.archive.member);
            debug!(derived = %derived, "derived working path");
            report.derived_path = Some(derived.clone());
            derived
        }
    };

    if let Some(pattern) = &ctx.config.filter.pattern {
        let name = ctx.names.filter_output(report.counter);
        let output = tools
            .filter(root, pattern, &working, &root.join(&name))
            .map_err(|err| stage_error(Stage::Filter, &err))?;
        log.record("filter", &output);
        report.filter_output = Some(name);
        // grep-style status: 0 matched, 1 no match, anything else is an error.
        match (output.timed_out, output.exit_code) {
            (false, Some(0)) => report.filter_matched = Some(true),
            (false, Some(1)) => {
                debug!("filter matched no lines");
                report.filter_matched = Some(false);
            }
            _ => {
                return Err(
                    ItemFailure::new(Stage::Filter, output.describe_failure("filter")).into(),
                );
            }
        }
    }

    let values = ValueContext {
        item: report.item.clone(),
        counter: report.counter,
        base: ctx.names.base().to_string(),
        derived_path: report.derived_path.clone(),
        filter_output: report.filter_output.clone(),
        result_file: report.result_file.clone(),
    };
    let substitutions = ctx
        .placeholders
        .substitutions(&values)
        .map_err(|err| stage_error(Stage::Render, &err))?;

    let template = fs::read_to_string(ctx.template_path)
        .with_context(|| format!("read template {}", ctx.template_path.display()))?;
    let rendered = render_template(&template, &substitutions);
    let prefix = format!("{}_{}_", ctx.names.base(), report.counter);
    let script = write_script(ctx.script_dir, &prefix, &rendered, ctx.config.keep_scripts)?;
    debug!(
        script = %script.path().display(),
        source = ?substitutions.value(Placeholder::Source),
        "rendered script"
    );

    let output = tools
        .run_script(root, script.path())
        .map_err(|err| stage_error(Stage::Run, &err))?;
    log.record("run", &output);
    if !output.success() {
        return Err(ItemFailure::new(Stage::Run, output.describe_failure("runner")).into());
    }
    Ok(())
}

fn stage_error(stage: Stage, err: &anyhow::Error) -> ItemFailure {
    ItemFailure::new(stage, format!("{err:#}"))
}
