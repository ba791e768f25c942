//! Orchestration for a whole batch: setup, per-item loop, merge, relocation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::items::parse_items;
use crate::core::naming::OutputNames;
use crate::core::placeholders::ValueContext;
use crate::core::template::missing_placeholders;
use crate::io::config::DriverConfig;
use crate::io::init::DriverPaths;
use crate::io::relocate::move_into;
use crate::io::run_log::{RunSummary, ToolLog, write_run_log, write_summary};
use crate::io::tools::Toolchain;
use crate::item::{ItemContext, ItemReport, process_item};

/// Inputs that vary per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Item list, relative to the run root unless absolute.
    pub item_list: PathBuf,
    /// Base name every output file is derived from.
    pub output_base: String,
}

/// Reason the per-item loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStop {
    /// Every item was processed.
    Exhausted,
    /// The counter went past the configured limit; later items were skipped.
    LimitReached { limit: u32 },
    /// `fail_fast` stopped the loop after the failing item.
    FailFast { counter: u32 },
}

impl BatchStop {
    pub fn describe(&self) -> String {
        match self {
            BatchStop::Exhausted => "exhausted".to_string(),
            BatchStop::LimitReached { limit } => format!("limit_reached(limit={limit})"),
            BatchStop::FailFast { counter } => format!("fail_fast(counter={counter})"),
        }
    }
}

/// What the merge step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No per-item result files existed; the merge tool was not invoked.
    NoResults,
    /// The merge tool combined `inputs` into `aggregate` (final location).
    Merged {
        aggregate: PathBuf,
        inputs: Vec<PathBuf>,
    },
}

/// Summary of a batch invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub base: String,
    pub processed: u32,
    pub failed: u32,
    pub skipped: usize,
    pub stop: BatchStop,
    pub merge: MergeOutcome,
    pub summary_path: PathBuf,
}

impl BatchOutcome {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn aggregate(&self) -> Option<&Path> {
        match &self.merge {
            MergeOutcome::Merged { aggregate, .. } => Some(aggregate),
            MergeOutcome::NoResults => None,
        }
    }
}

/// Run every item of `request.item_list` through the pipeline, then merge.
///
/// Items run strictly one after another. Per-item failures are recorded and
/// the loop continues unless `fail_fast` is set. Configuration, item-list,
/// template, setup, merge, and relocation failures abort with an error.
#[instrument(skip_all, fields(item_list = %request.item_list.display(), base = %request.output_base))]
pub fn run_batch<T: Toolchain, F: FnMut(&ItemReport)>(
    root: &Path,
    config: &DriverConfig,
    request: &BatchRequest,
    tools: &T,
    mut on_item: F,
) -> Result<BatchOutcome> {
    let started_at = Utc::now();
    config.validate()?;
    let paths = DriverPaths::new(root);
    let names = OutputNames::new(&request.output_base, &config.result_extension)?;
    let placeholders = config.placeholder_map()?;
    let limit = config.item_limit();

    let item_list = paths.resolve(&request.item_list);
    let contents = fs::read_to_string(&item_list)
        .with_context(|| format!("read item list {}", item_list.display()))?;
    let items = parse_items(&contents);

    let template_path = paths.resolve(&config.template_path);
    let template = fs::read_to_string(&template_path)
        .with_context(|| format!("read template {}", template_path.display()))?;
    let sample = placeholders.substitutions(&ValueContext::sample(
        config.mode,
        config.filter_enabled(),
    ))?;
    for missing in missing_placeholders(&template, &sample) {
        warn!(
            placeholder = missing.as_str(),
            token = %placeholders.rule(missing).token,
            "template does not contain placeholder token"
        );
    }
    let script_dir = paths.resolve(&config.script_dir);

    info!(
        items = items.len(),
        mode = config.mode.as_str(),
        max_items = ?limit.max_processed(),
        "starting batch"
    );

    if let Some(output) = tools.setup(root)? {
        if !output.success() {
            bail!("setup failed: {}", output.describe_failure("setup command"));
        }
        debug!("setup completed");
    }

    let ctx = ItemContext {
        paths: &paths,
        config,
        names: &names,
        placeholders: &placeholders,
        template_path: &template_path,
        script_dir: &script_dir,
    };

    let mut counter = 0u32;
    let mut failed = 0u32;
    let mut stop = BatchStop::Exhausted;
    for item in &items {
        counter += 1;
        let report = process_item(&ctx, counter, item, tools)?;
        info!(
            counter,
            item = %item,
            status = report.status().as_str(),
            "item done"
        );
        on_item(&report);

        if report.failure.is_some() {
            failed += 1;
            if config.fail_fast {
                stop = BatchStop::FailFast { counter };
                break;
            }
        }
        if limit.exceeded_by(counter) {
            info!(counter, "item limit exceeded, skipping remaining items");
            stop = BatchStop::LimitReached {
                limit: limit.value().unwrap_or_default(),
            };
            break;
        }
    }
    let skipped = items.len() - counter as usize;

    let merged = merge_results(&paths, &names, counter, tools)
        .and_then(|merge| relocate_aggregate(&paths, merge, config.destination_dir.as_deref()));

    let (merged_inputs, aggregate) = match &merged {
        Ok(MergeOutcome::Merged { aggregate, inputs }) => (
            inputs.iter().map(|p| p.display().to_string()).collect(),
            Some(aggregate.display().to_string()),
        ),
        Ok(MergeOutcome::NoResults) | Err(_) => (Vec::new(), None),
    };
    let summary_path = write_summary(
        &paths,
        &RunSummary {
            base: names.base().to_string(),
            item_list: item_list.display().to_string(),
            processed: counter,
            failed,
            skipped,
            stop: stop.describe(),
            merged_inputs,
            aggregate,
            error: merged.as_ref().err().map(|err| format!("{err:#}")),
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ended_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        },
    )?;
    let merge = merged?;

    Ok(BatchOutcome {
        base: names.base().to_string(),
        processed: counter,
        failed,
        skipped,
        stop,
        merge,
        summary_path,
    })
}

/// Per-item result files in the run root, ordered by counter.
///
/// The aggregate never matches, so a previous run's aggregate is not merged
/// back into itself.
pub fn collect_results(root: &Path, names: &OutputNames) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
        let entry = entry.context("read entry")?;
        if !entry.file_type().context("read file type")?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(counter) = names.result_counter(name) {
            found.push((counter, PathBuf::from(name)));
        }
    }
    found.sort();
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

fn relocate_aggregate(
    paths: &DriverPaths,
    merge: MergeOutcome,
    destination: Option<&Path>,
) -> Result<MergeOutcome> {
    match (merge, destination) {
        (MergeOutcome::Merged { aggregate, inputs }, Some(dest)) => {
            let dest = paths.resolve(dest);
            let moved = move_into(&aggregate, &dest)
                .with_context(|| format!("relocate aggregate to {}", dest.display()))?;
            info!(aggregate = %moved.display(), "relocated aggregate");
            Ok(MergeOutcome::Merged {
                aggregate: moved,
                inputs,
            })
        }
        (merge, _) => Ok(merge),
    }
}

fn merge_results<T: Toolchain>(
    paths: &DriverPaths,
    names: &OutputNames,
    processed: u32,
    tools: &T,
) -> Result<MergeOutcome> {
    let inputs = collect_results(&paths.root, names)?;
    if inputs.is_empty() {
        warn!(pattern = %names.merge_pattern(), "no result files to merge");
        return Ok(MergeOutcome::NoResults);
    }
    let stale = inputs
        .iter()
        .filter_map(|p| p.to_str().and_then(|name| names.result_counter(name)))
        .filter(|counter| *counter > processed)
        .count();
    if stale > 0 {
        warn!(stale, "merging result files numbered beyond this run");
    }

    let aggregate = PathBuf::from(names.aggregate());
    info!(inputs = inputs.len(), aggregate = %aggregate.display(), "merging results");
    let output = tools.merge(&paths.root, &aggregate, &inputs)?;
    let mut log = ToolLog::default();
    log.record("merge", &output);
    write_run_log(paths, names.base(), "merge.log", &log)?;
    if !output.success() {
        bail!("merge failed: {}", output.describe_failure("merge tool"));
    }

    let aggregate = paths.root.join(aggregate);
    if !aggregate.is_file() {
        return Err(anyhow!(
            "merge tool succeeded but {} was not created",
            aggregate.display()
        ));
    }
    Ok(MergeOutcome::Merged { aggregate, inputs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Stage;
    use crate::io::tools::ToolOutput;
    use crate::test_support::{ScriptedToolchain, TestRoot, archive_config, token_config};

    fn request() -> BatchRequest {
        BatchRequest {
            item_list: PathBuf::from("items.txt"),
            output_base: "out".to_string(),
        }
    }

    fn run(
        root: &TestRoot,
        config: &DriverConfig,
        tools: &ScriptedToolchain,
    ) -> Result<(BatchOutcome, Vec<ItemReport>)> {
        let mut reports = Vec::new();
        let outcome = run_batch(root.path(), config, &request(), tools, |report| {
            reports.push(report.clone());
        })?;
        Ok((outcome, reports))
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn items_are_numbered_in_order_and_merged_once() {
        let root = TestRoot::new().expect("root");
        root.write_items(&["alpha", "beta", "gamma"]).expect("items");
        let tools = ScriptedToolchain::new();

        let (outcome, reports) = run(&root, &token_config(), &tools).expect("batch");

        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.stop, BatchStop::Exhausted);
        let counters: Vec<u32> = reports.iter().map(|r| r.counter).collect();
        assert_eq!(counters, vec![1, 2, 3]);
        assert!(tools.scripts()[1].contains("# source: beta\ntouch out_2.root\n"));

        let merges = tools.merges();
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].0, PathBuf::from("out_All.root"));
        assert_eq!(merges[0].1, paths(&["out_1.root", "out_2.root", "out_3.root"]));
        assert_eq!(
            outcome.aggregate(),
            Some(root.path().join("out_All.root").as_path())
        );
        assert_eq!(
            root.read("out_All.root").expect("aggregate"),
            "out_1.root\nout_2.root\nout_3.root\n"
        );
    }

    #[test]
    fn blank_lines_do_not_consume_counter_values() {
        let root = TestRoot::new().expect("root");
        root.write("items.txt", "a\n\n  \nb\n").expect("items");
        let tools = ScriptedToolchain::new();

        let (outcome, reports) = run(&root, &token_config(), &tools).expect("batch");

        assert_eq!(outcome.processed, 2);
        assert_eq!(reports[1].item, "b");
        assert_eq!(reports[1].result_file, "out_2.root");
    }

    #[test]
    fn limit_processes_one_item_past_threshold() {
        let root = TestRoot::new().expect("root");
        root.write_items(&["a", "b", "c", "d", "e"]).expect("items");
        let mut config = token_config();
        config.limit = 2;
        let tools = ScriptedToolchain::new();

        let (outcome, _) = run(&root, &config, &tools).expect("batch");

        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.stop, BatchStop::LimitReached { limit: 2 });
        assert_eq!(tools.scripts().len(), 3);
        assert_eq!(
            tools.merges()[0].1,
            paths(&["out_1.root", "out_2.root", "out_3.root"])
        );
    }

    #[test]
    fn unlimited_processes_every_item() {
        let root = TestRoot::new().expect("root");
        root.write_items(&["a", "b", "c", "d"]).expect("items");
        let mut config = token_config();
        config.limit = 1;
        config.unlimited = true;
        let tools = ScriptedToolchain::new();

        let (outcome, _) = run(&root, &config, &tools).expect("batch");

        assert_eq!(outcome.processed, 4);
        assert_eq!(outcome.stop, BatchStop::Exhausted);
    }

    #[test]
    fn failed_items_are_recorded_and_loop_continues() {
        let root = TestRoot::new().expect("root");
        root.write_items(&["a.tgz", "b.tgz", "c.tgz"]).expect("items");
        let tools = ScriptedToolchain::new()
            .with_failing_archive("b.tgz")
            .with_listing("c.tgz", "");

        let (outcome, reports) = run(&root, &archive_config("CUT"), &tools).expect("batch");

        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.failed, 2);
        assert!(outcome.has_failures());
        assert_eq!(reports[1].failure.as_ref().map(|f| f.stage), Some(Stage::Extract));
        assert_eq!(reports[2].failure.as_ref().map(|f| f.stage), Some(Stage::Listing));
        assert_eq!(tools.merges()[0].1, paths(&["out_1.root"]));
    }

    #[test]
    fn fail_fast_stops_after_first_failure() {
        let root = TestRoot::new().expect("root");
        root.write_items(&["a.tgz", "b.tgz", "c.tgz"]).expect("items");
        let mut config = archive_config("CUT");
        config.fail_fast = true;
        let tools = ScriptedToolchain::new().with_failing_archive("b.tgz");

        let (outcome, _) = run(&root, &config, &tools).expect("batch");

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.stop, BatchStop::FailFast { counter: 2 });
        assert_eq!(tools.merges()[0].1, paths(&["out_1.root"]));
    }

    #[test]
    fn merge_ignores_aggregate_and_other_bases() {
        let root = TestRoot::new().expect("root");
        root.write_items(&["a"]).expect("items");
        root.write("out_All.root", "old aggregate\n").expect("old aggregate");
        root.write("other_1.root", "other\n").expect("other base");
        root.write("out_1.txt", "wrong ext\n").expect("other ext");
        let tools = ScriptedToolchain::new();

        run(&root, &token_config(), &tools).expect("batch");

        assert_eq!(tools.merges()[0].1, paths(&["out_1.root"]));
        assert_eq!(root.read("out_All.root").expect("aggregate"), "out_1.root\n");
    }

    #[test]
    fn results_are_ordered_numerically() {
        let root = TestRoot::new().expect("root");
        for name in ["out_10.root", "out_2.root", "out_1.root"] {
            root.write(name, "").expect("result");
        }
        let names = OutputNames::new("out", "root").expect("names");

        let found = collect_results(root.path(), &names).expect("collect");

        assert_eq!(found, paths(&["out_1.root", "out_2.root", "out_10.root"]));
    }

    #[test]
    fn no_results_skips_merge() {
        let root = TestRoot::new().expect("root");
        root.write("RunRootMASTER.sh", "echo XXXX YYYY\n").expect("template");
        root.write_items(&["a", "b"]).expect("items");
        let tools = ScriptedToolchain::new();

        let (outcome, _) = run(&root, &token_config(), &tools).expect("batch");

        assert_eq!(outcome.merge, MergeOutcome::NoResults);
        assert!(tools.merges().is_empty());
        assert!(!root.exists("out_All.root"));
    }

    #[test]
    fn aggregate_is_moved_to_destination() {
        let root = TestRoot::new().expect("root");
        root.write_items(&["a", "b"]).expect("items");
        let mut config = token_config();
        config.destination_dir = Some(PathBuf::from("done"));
        let tools = ScriptedToolchain::new();

        let (outcome, _) = run(&root, &config, &tools).expect("batch");

        let moved = root.path().join("done").join("out_All.root");
        assert_eq!(outcome.aggregate(), Some(moved.as_path()));
        assert!(moved.is_file());
        assert!(!root.exists("out_All.root"));
    }

    #[test]
    fn setup_failure_aborts_before_items() {
        let root = TestRoot::new().expect("root");
        root.write_items(&["a"]).expect("items");
        let tools = ScriptedToolchain::new().with_setup(ToolOutput::exited(1, "make: *** error"));

        let err = run(&root, &token_config(), &tools).expect_err("setup failure");

        assert!(format!("{err:#}").contains("setup failed"));
        assert!(tools.scripts().is_empty());
    }

    #[test]
    fn merge_failure_is_fatal() {
        let root = TestRoot::new().expect("root");
        root.write_items(&["a"]).expect("items");
        let tools = ScriptedToolchain::new().with_merge_exit(1);

        let err = run(&root, &token_config(), &tools).expect_err("merge failure");

        assert!(format!("{err:#}").contains("merge failed"));
        assert!(root.exists(".driver/runs/out/merge.log"));
        let summary: serde_json::Value = serde_json::from_str(
            &root.read(".driver/runs/out/summary.json").expect("summary"),
        )
        .expect("parse summary");
        assert_eq!(summary["processed"], 1);
        assert_eq!(summary["aggregate"], serde_json::Value::Null);
        assert!(
            summary["error"]
                .as_str()
                .expect("error recorded")
                .contains("merge failed")
        );
    }

    #[test]
    fn missing_item_list_is_an_error() {
        let root = TestRoot::new().expect("root");
        let tools = ScriptedToolchain::new();

        let err = run(&root, &token_config(), &tools).expect_err("missing list");

        assert!(format!("{err:#}").contains("read item list"));
        assert!(tools.calls().is_empty());
    }

    #[test]
    fn summary_is_written() {
        let root = TestRoot::new().expect("root");
        root.write_items(&["a", "b"]).expect("items");
        let tools = ScriptedToolchain::new();

        let (outcome, _) = run(&root, &token_config(), &tools).expect("batch");

        let raw = std::fs::read_to_string(&outcome.summary_path).expect("summary");
        let summary: serde_json::Value = serde_json::from_str(&raw).expect("parse summary");
        assert_eq!(summary["processed"], 2);
        assert_eq!(summary["failed"], 0);
        assert_eq!(summary["stop"], "exhausted");
        assert_eq!(summary["merged_inputs"][1], "out_2.root");
    }
}
