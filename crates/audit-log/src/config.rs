use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Retention knobs for the in-memory trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub max_entries: usize,
    pub retention: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            retention: DEFAULT_RETENTION,
        }
    }
}
