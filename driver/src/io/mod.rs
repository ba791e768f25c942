//! I/O helpers for driver commands.

pub mod config;
pub mod init;
pub mod process;
pub mod relocate;
pub mod run_log;
pub mod script;
pub mod tools;
