use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, warn};

use crate::config::AuditConfig;
use crate::errors::AuditError;
use crate::model::{Actor, AuditCategory, AuditEntry, AuditFilter, AuditLevel, AuditStats};
use crate::sink::AuditSink;
use crate::writer::{self, SharedSinks, SinkWriterHandle};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Append-only audit trail shared by every request.
///
/// Appends never fail from the caller's point of view. Sinks run on a
/// background writer thread; their errors and panics are reported through
/// `tracing` and otherwise swallowed.
pub struct AuditLog {
    config: AuditConfig,
    entries: RwLock<VecDeque<AuditEntry>>,
    sinks: SharedSinks,
    writer: Mutex<Option<SinkWriterHandle>>,
    events: broadcast::Sender<AuditEntry>,
}

impl AuditLog {
    pub fn new(config: AuditConfig) -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config: AuditConfig {
                max_entries: config.max_entries.max(1),
                retention: config.retention,
            },
            entries: RwLock::new(VecDeque::new()),
            sinks: Arc::new(RwLock::new(Vec::new())),
            writer: Mutex::new(None),
            events: tx,
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Registers a sink. The writer thread is started with the first one.
    pub fn add_sink(&self, sink: Arc<dyn AuditSink>) {
        let mut writer = self.writer.lock();
        if writer.is_none() {
            match writer::spawn(self.sinks.clone()) {
                Ok(handle) => *writer = Some(handle),
                Err(err) => {
                    error!(
                        target: "audit-log",
                        sink = sink.name(),
                        "failed to start audit sink writer: {err}"
                    );
                    return;
                }
            }
        }
        self.sinks.write().push(sink);
    }

    /// Blocks until every entry recorded so far has been handed to the sinks.
    /// Meant for shutdown paths and tests, not for request handling.
    pub fn flush(&self) -> Result<(), AuditError> {
        match self.writer.lock().as_ref() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.events.subscribe()
    }

    pub fn record(&self, entry: AuditEntry) {
        {
            let mut entries = self.entries.write();
            entries.push_back(entry.clone());
            while entries.len() > self.config.max_entries {
                entries.pop_front();
            }
        }

        self.forward_to_sinks(&entry);

        if self.events.receiver_count() > 0 {
            if let Err(err) = self.events.send(entry) {
                warn!(target: "audit-log", "failed to publish audit entry: {err}");
            }
        }
    }

    fn forward_to_sinks(&self, entry: &AuditEntry) {
        let writer = self.writer.lock();
        let Some(writer) = writer.as_ref() else {
            return;
        };
        if let Err(err) = writer.append(entry.clone()) {
            error!(
                target: "audit-log",
                entry_id = %entry.id,
                "failed to queue audit entry for sinks: {err}"
            );
        }
    }

    pub fn authentication(&self, actor: Option<Actor>, action: &str, success: bool, details: Value) {
        let level = if success {
            AuditLevel::Info
        } else {
            AuditLevel::Warning
        };
        self.record(
            AuditEntry::new(AuditCategory::Authentication, level, action, "session")
                .actor(actor)
                .success(success)
                .details(details),
        );
    }

    pub fn authorization(
        &self,
        actor: Option<Actor>,
        action: &str,
        resource: &str,
        resource_id: Option<String>,
        success: bool,
        details: Value,
    ) {
        let level = if success {
            AuditLevel::Info
        } else {
            AuditLevel::Warning
        };
        self.authorization_at(level, actor, action, resource, resource_id, success, details);
    }

    /// Authorization entry with an explicit level, e.g. `Security` for
    /// unknown permissions or evaluation failures.
    #[allow(clippy::too_many_arguments)]
    pub fn authorization_at(
        &self,
        level: AuditLevel,
        actor: Option<Actor>,
        action: &str,
        resource: &str,
        resource_id: Option<String>,
        success: bool,
        details: Value,
    ) {
        let mut entry = AuditEntry::new(AuditCategory::Authorization, level, action, resource)
            .actor(actor)
            .success(success)
            .details(details);
        entry.resource_id = resource_id;
        self.record(entry);
    }

    pub fn data_access(&self, actor: Option<Actor>, resource: &str, resource_id: Option<String>) {
        let mut entry = AuditEntry::new(AuditCategory::DataAccess, AuditLevel::Info, "read", resource)
            .actor(actor);
        entry.resource_id = resource_id;
        self.record(entry);
    }

    pub fn data_modification(
        &self,
        actor: Option<Actor>,
        action: &str,
        resource: &str,
        resource_id: Option<String>,
        details: Value,
    ) {
        let mut entry =
            AuditEntry::new(AuditCategory::DataModification, AuditLevel::Info, action, resource)
                .actor(actor)
                .details(details);
        entry.resource_id = resource_id;
        self.record(entry);
    }

    /// Explicit security events: status changes, bulk operations, denied
    /// evaluations that hit an internal failure.
    pub fn security_event(&self, actor: Option<Actor>, action: &str, success: bool, details: Value) {
        self.record(
            AuditEntry::new(AuditCategory::Security, AuditLevel::Security, action, "system")
                .actor(actor)
                .success(success)
                .details(details),
        );
    }

    pub fn system_event(&self, action: &str, details: Value) {
        self.record(
            AuditEntry::new(AuditCategory::System, AuditLevel::Info, action, "system")
                .details(details),
        );
    }

    /// Matching entries, newest first.
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let entries = self.entries.read();
        let matched = entries.iter().rev().filter(|entry| filter.matches(entry));
        match filter.limit {
            Some(limit) => matched.take(limit).cloned().collect(),
            None => matched.cloned().collect(),
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.query(&AuditFilter {
            limit: Some(limit),
            ..AuditFilter::default()
        })
    }

    /// Drops entries older than `age`. Returns how many were removed.
    pub fn prune(&self, age: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(age) else {
            return 0;
        };
        let cutoff = Utc::now() - age;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.timestamp >= cutoff);
        before - entries.len()
    }

    pub fn prune_expired(&self) -> usize {
        self.prune(self.config.retention)
    }

    pub fn stats(&self) -> AuditStats {
        let entries = self.entries.read();
        let mut stats = AuditStats {
            total: entries.len(),
            ..AuditStats::default()
        };
        for entry in entries.iter() {
            if !entry.success {
                stats.failures += 1;
            }
            *stats.by_level.entry(entry.level.as_str().to_string()).or_default() += 1;
            *stats
                .by_category
                .entry(entry.category.as_str().to_string())
                .or_default() += 1;
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}
