//! Deterministic, pure logic shared by the driver.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! strings and return deterministic outputs suitable for tests.

pub mod items;
pub mod limit;
pub mod listing;
pub mod naming;
pub mod placeholders;
pub mod template;
pub mod types;
pub mod wildcard;
