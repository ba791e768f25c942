//! Batch driver CLI.
//!
//! `driver <ITEM_LIST> <OUTPUT_BASE>` renders and runs one script per item
//! and merges the per-item results. `driver discover` builds an item list from
//! files in the current directory; `driver init` writes a starter config.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use driver::batch::{BatchRequest, MergeOutcome, run_batch};
use driver::core::types::ItemMode;
use driver::discover::discover_items;
use driver::exit_codes;
use driver::io::config::{ConfigOverrides, apply_overrides, load_config};
use driver::io::init::{CONFIG_FILE, InitOptions, init_workspace};
use driver::io::tools::CommandToolchain;
use driver::logging;

#[derive(Parser, Debug)]
#[command(
    name = "driver",
    version,
    about = "Render and run one script per item, then merge the results",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the names of matching files in the current directory to an item list.
    Discover {
        /// Wildcard pattern (`*` and `?`).
        #[arg(default_value = "*.tgz")]
        pattern: String,
        /// Item list to write.
        #[arg(short, long, default_value = "items.txt")]
        output: PathBuf,
    },
    /// Write `driver.toml` and a starter template.
    Init {
        /// Overwrite an existing `driver.toml`.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// File listing one item per line. A list named `discover` or `init` is
    /// read as that subcommand; pass it as `./discover` or `./init`.
    #[arg(required = true)]
    item_list: Option<PathBuf>,
    /// Base name for filter outputs, result files, and the aggregate.
    #[arg(required = true)]
    output_base: Option<String>,
    /// Config file.
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,
    /// How each item is interpreted.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Script template.
    #[arg(long)]
    template: Option<PathBuf>,
    /// Filter pattern; enables the filter stage.
    #[arg(long)]
    pattern: Option<String>,
    /// Stop once the item counter exceeds this value.
    #[arg(long, conflicts_with = "no_limit")]
    limit: Option<u32>,
    /// Process every item.
    #[arg(long)]
    no_limit: bool,
    /// Move the aggregate into this directory after merging.
    #[arg(long)]
    destination: Option<PathBuf>,
    /// Stop after the first failing item.
    #[arg(long)]
    fail_fast: bool,
    /// Keep rendered scripts after they run.
    #[arg(long)]
    keep_scripts: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ModeArg {
    Token,
    Archive,
}

impl From<ModeArg> for ItemMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Token => ItemMode::Token,
            ModeArg::Archive => ItemMode::Archive,
        }
    }
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            mode: self.mode.map(ItemMode::from),
            template_path: self.template.clone(),
            pattern: self.pattern.clone(),
            limit: self.limit,
            unlimited: self.no_limit,
            destination_dir: self.destination.clone(),
            fail_fast: self.fail_fast,
            keep_scripts: self.keep_scripts,
        }
    }
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Some(Command::Discover { pattern, output }) => cmd_discover(&pattern, output),
        Some(Command::Init { force }) => cmd_init(force),
        None => cmd_run(cli.run),
    }
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let root = std::env::current_dir().context("resolve current directory")?;
    let overrides = args.overrides();
    let (Some(item_list), Some(output_base)) = (args.item_list, args.output_base) else {
        anyhow::bail!("usage: driver <ITEM_LIST> <OUTPUT_BASE>");
    };
    let config_path = if args.config.is_absolute() {
        args.config
    } else {
        root.join(args.config)
    };
    let config = apply_overrides(load_config(&config_path)?, &overrides)?;
    let tools = CommandToolchain::from_config(&config);
    let request = BatchRequest {
        item_list,
        output_base,
    };

    let outcome = run_batch(&root, &config, &request, &tools, |report| {
        println!(
            "item: n={} status={} item={}",
            report.counter,
            report.status().as_str(),
            report.item
        );
    })?;

    match &outcome.merge {
        MergeOutcome::Merged { aggregate, inputs } => println!(
            "merged: inputs={} aggregate={}",
            inputs.len(),
            aggregate.display()
        ),
        MergeOutcome::NoResults => println!("merged: inputs=0"),
    }
    println!(
        "done: processed={} failed={} skipped={} stop={}",
        outcome.processed,
        outcome.failed,
        outcome.skipped,
        outcome.stop.describe()
    );

    if outcome.has_failures() {
        Ok(exit_codes::ITEM_FAILURES)
    } else {
        Ok(exit_codes::OK)
    }
}

fn cmd_discover(pattern: &str, output: PathBuf) -> Result<i32> {
    let root = std::env::current_dir().context("resolve current directory")?;
    let outcome = discover_items(&root, pattern, &output)?;
    println!(
        "discovered: count={} output={}",
        outcome.items.len(),
        outcome.output.display()
    );
    Ok(exit_codes::OK)
}

fn cmd_init(force: bool) -> Result<i32> {
    let root = std::env::current_dir().context("resolve current directory")?;
    let outcome = init_workspace(&root, &InitOptions { force })?;
    println!("config: {}", outcome.config_path.display());
    if let Some(template) = outcome.template_path {
        println!("template: {}", template.display());
    }
    Ok(exit_codes::OK)
}
