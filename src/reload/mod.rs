//! Reload Module
//!
//! Table schemas, reload jobs, the transactional bulk replace and the
//! retry policy that governs a run.

mod job;
mod replace;
mod table;

pub use job::{ReloadJob, RowValidator};
pub use replace::BulkReplace;
pub use table::{Column, ColumnKind, Field, Row, TableSchema};

use std::time::Duration;

/// Step of a reload attempt, used to attribute failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStep {
    Setup,
    Fetch,
    Archive,
    Parse,
    Validate,
    Discover,
    Connect,
    Begin,
    Delete,
    Insert,
    Commit,
    Rollback,
}

impl std::fmt::Display for ReloadStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadStep::Setup => write!(f, "SETUP"),
            ReloadStep::Fetch => write!(f, "FETCH"),
            ReloadStep::Archive => write!(f, "ARCHIVE"),
            ReloadStep::Parse => write!(f, "PARSE"),
            ReloadStep::Validate => write!(f, "VALIDATE"),
            ReloadStep::Discover => write!(f, "DISCOVER"),
            ReloadStep::Connect => write!(f, "CONNECT"),
            ReloadStep::Begin => write!(f, "BEGIN"),
            ReloadStep::Delete => write!(f, "DELETE"),
            ReloadStep::Insert => write!(f, "INSERT"),
            ReloadStep::Commit => write!(f, "COMMIT"),
            ReloadStep::Rollback => write!(f, "ROLLBACK"),
        }
    }
}

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Ceiling on fetch-transform-write attempts
    pub max_attempts: u32,
    /// Delay before the next attempt
    pub wait: Duration,
    /// Give up on the first dataset that fails validation
    pub fail_fast_on_invalid_rows: bool,
}

impl RetryPolicy {
    /// Upper bound on the time spent waiting between attempts
    pub fn max_total_wait(&self) -> Duration {
        self.wait * self.max_attempts.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            wait: Duration::from_secs(30),
            fail_fast_on_invalid_rows: false,
        }
    }
}
