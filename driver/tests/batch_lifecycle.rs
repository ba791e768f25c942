//! Library-level batch tests.
//!
//! Drive `run_batch` across repeated runs in one root, with both the scripted
//! toolchain and the real command toolchain.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use driver::batch::{BatchRequest, BatchStop, MergeOutcome, run_batch};
use driver::core::types::Stage;
use driver::io::config::DriverConfig;
use driver::io::tools::CommandToolchain;
use driver::test_support::{ScriptedToolchain, TestRoot, token_config};

fn request(base: &str) -> BatchRequest {
    BatchRequest {
        item_list: PathBuf::from("items.txt"),
        output_base: base.to_string(),
    }
}

/// A shorter second run in the same root still merges the earlier run's
/// higher-numbered results, but never the previous aggregate.
#[test]
fn rerun_with_fewer_items_merges_stale_results() {
    let root = TestRoot::new().expect("root");
    let config = token_config();

    root.write_items(&["a", "b", "c"]).expect("items");
    let first = ScriptedToolchain::new();
    run_batch(root.path(), &config, &request("out"), &first, |_| {}).expect("first run");
    assert!(root.exists("out_All.root"));

    root.write_items(&["x"]).expect("items");
    let second = ScriptedToolchain::new();
    let outcome =
        run_batch(root.path(), &config, &request("out"), &second, |_| {}).expect("second run");

    assert_eq!(outcome.processed, 1);
    let merges = second.merges();
    assert_eq!(
        merges[0].1,
        vec![
            PathBuf::from("out_1.root"),
            PathBuf::from("out_2.root"),
            PathBuf::from("out_3.root"),
        ]
    );
}

/// Separate output bases in one root keep their results and logs apart.
#[test]
fn distinct_bases_do_not_mix() {
    let root = TestRoot::new().expect("root");
    let config = token_config();
    root.write_items(&["a", "b"]).expect("items");

    let tools = ScriptedToolchain::new();
    run_batch(root.path(), &config, &request("left"), &tools, |_| {}).expect("left");
    let outcome = run_batch(root.path(), &config, &request("right"), &tools, |_| {})
        .expect("right");

    match outcome.merge {
        MergeOutcome::Merged { inputs, .. } => assert_eq!(
            inputs,
            vec![PathBuf::from("right_1.root"), PathBuf::from("right_2.root")]
        ),
        MergeOutcome::NoResults => panic!("expected merge"),
    }
    assert!(root.exists(".driver/runs/left/summary.json"));
    assert!(root.exists(".driver/runs/right/2/meta.json"));
}

/// The command toolchain runs setup, scripts, and merge as real processes.
#[test]
fn command_toolchain_runs_setup_scripts_and_merge() {
    let root = TestRoot::new().expect("root");
    root.write("RunRootMASTER.sh", "cat marker > YYYY\necho XXXX >> YYYY\n")
        .expect("template");
    root.write_items(&["one", "two"]).expect("items");

    let mut config = DriverConfig::default();
    config.setup.command = vec!["sh".into(), "-c".into(), "echo built > marker".into()];
    config.merge.command = vec!["sh".into(), "-c".into(), "cat \"$@\" > \"$0\"".into()];
    config.tool_timeout_secs = 30;
    let tools = CommandToolchain::from_config(&config);

    let outcome = run_batch(root.path(), &config, &request("out"), &tools, |_| {}).expect("run");

    assert_eq!(outcome.stop, BatchStop::Exhausted);
    assert_eq!(
        fs::read_to_string(root.path().join("out_All.root")).expect("aggregate"),
        "built\none\nbuilt\ntwo\n"
    );
    let tools_log = root.read(".driver/runs/out/2/tools.log").expect("tools log");
    assert!(tools_log.contains("=== run (exit 0) ==="));
}

/// A runner that outlives `tool_timeout_secs` is stopped together with the
/// jobs it started, so the next item never overlaps it.
#[test]
fn timed_out_script_does_not_hold_up_the_batch() {
    let root = TestRoot::new().expect("root");
    root.write("RunRootMASTER.sh", "sleep 6\necho XXXX > YYYY\n")
        .expect("template");
    root.write_items(&["slow"]).expect("items");

    let mut config = DriverConfig::default();
    config.merge.command = vec!["sh".into(), "-c".into(), "cat \"$@\" > \"$0\"".into()];
    config.tool_timeout_secs = 1;
    let tools = CommandToolchain::from_config(&config);

    let start = Instant::now();
    let mut reports = Vec::new();
    let outcome = run_batch(root.path(), &config, &request("out"), &tools, |report| {
        reports.push(report.clone());
    })
    .expect("run");

    assert!(
        start.elapsed() < Duration::from_secs(4),
        "batch took {:?}",
        start.elapsed()
    );
    assert_eq!(outcome.failed, 1);
    let failure = reports[0].failure.as_ref().expect("failure");
    assert_eq!(failure.stage, Stage::Run);
    assert!(failure.message.contains("timed out"));
    assert_eq!(outcome.merge, MergeOutcome::NoResults);
    assert!(!root.exists("out_1.root"));
}
