//! Shared deterministic types for driver core logic.
//!
//! These types define stable contracts between the pure core and the
//! orchestration layer. They must not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How an item line is turned into a working path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemMode {
    /// The raw item text is used directly as the working token.
    #[default]
    Token,
    /// The item names an archive; extraction yields the working directory.
    Archive,
}

impl ItemMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemMode::Token => "token",
            ItemMode::Archive => "archive",
        }
    }
}

/// Per-item pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Listing,
    Filter,
    Render,
    Run,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Listing => "listing",
            Stage::Filter => "filter",
            Stage::Render => "render",
            Stage::Run => "run",
        }
    }
}

/// A per-item failure. Recorded in the run log; the batch continues unless
/// `fail_fast` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub stage: Stage,
    pub message: String,
}

impl ItemFailure {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage.as_str(), self.message)
    }
}

impl std::error::Error for ItemFailure {}

/// Final status of one processed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Ok,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Ok => "ok",
            ItemStatus::Failed => "failed",
        }
    }
}
