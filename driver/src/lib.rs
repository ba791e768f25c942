//! Batch driver for template-rendered shell jobs.
//!
//! Each line of an item list is pushed through a fixed pipeline: optionally
//! unpack it as an archive, optionally filter a file with a pattern, render a
//! script template by replacing placeholder tokens, and run the script. The
//! per-item result files are then merged into one aggregate.
//!
//! - **[`core`]**: Pure, deterministic logic (item parsing, naming, listing
//!   contract, template rendering). No I/O.
//! - **[`io`]**: Side-effecting operations (config, process execution, run
//!   logs, file relocation). The [`io::tools::Toolchain`] trait is the seam
//!   tests replace.
//!
//! Orchestration modules ([`batch`], [`item`], [`discover`]) combine the two
//! to implement CLI commands.

pub mod batch;
pub mod core;
pub mod discover;
pub mod exit_codes;
pub mod io;
pub mod item;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
