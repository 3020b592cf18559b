use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use schoolgate_core_types::{PrincipalId, Role};
use serde_json::json;

use crate::{
    Actor, AuditCategory, AuditConfig, AuditEntry, AuditError, AuditFilter, AuditLevel, AuditLog,
    AuditSink,
};

fn admin() -> Option<Actor> {
    Some(Actor {
        id: PrincipalId(1),
        role: Role::Admin,
    })
}

struct FailingSink {
    calls: AtomicUsize,
}

impl AuditSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn write(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AuditError::Sink {
            sink: "failing".into(),
            message: "disk full".into(),
        })
    }
}

struct SlowSink {
    delay: Duration,
    written: AtomicUsize,
}

impl AuditSink for SlowSink {
    fn name(&self) -> &str {
        "slow"
    }

    fn write(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
        std::thread::sleep(self.delay);
        self.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct PanickingSink;

impl AuditSink for PanickingSink {
    fn name(&self) -> &str {
        "panicking"
    }

    fn write(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
        panic!("sink exploded");
    }
}

#[test]
fn authorization_levels_follow_outcome() {
    let log = AuditLog::default();
    log.authorization(admin(), "view_admins", "permission", None, true, json!({}));
    log.authorization(admin(), "create_admin", "permission", None, false, json!({}));

    let entries = log.recent(10);
    assert_eq!(entries.len(), 2);
    // newest first
    assert_eq!(entries[0].action, "create_admin");
    assert_eq!(entries[0].level, AuditLevel::Warning);
    assert!(!entries[0].success);
    assert_eq!(entries[1].level, AuditLevel::Info);
    assert_eq!(entries[1].principal_id, Some(PrincipalId(1)));
    assert_eq!(entries[1].role, Some(Role::Admin));
}

#[test]
fn query_filters_combine() {
    let log = AuditLog::default();
    log.authentication(admin(), "token_verified", true, json!({}));
    log.authentication(None, "token_rejected", false, json!({"error": "expired"}));
    log.security_event(admin(), "teacher_status_changed", true, json!({"teacher": 7}));
    log.system_event("registry_reloaded", json!({}));

    let by_principal = log.query(&AuditFilter {
        principal_id: Some(PrincipalId(1)),
        ..AuditFilter::default()
    });
    assert_eq!(by_principal.len(), 2);

    let failed_auth = log.query(&AuditFilter {
        category: Some(AuditCategory::Authentication),
        success: Some(false),
        ..AuditFilter::default()
    });
    assert_eq!(failed_auth.len(), 1);
    assert_eq!(failed_auth[0].action, "token_rejected");

    let security = log.query(&AuditFilter {
        level: Some(AuditLevel::Security),
        ..AuditFilter::default()
    });
    assert_eq!(security.len(), 1);

    let future = log.query(&AuditFilter {
        since: Some(Utc::now() + chrono::Duration::hours(1)),
        ..AuditFilter::default()
    });
    assert!(future.is_empty());

    let by_action = log.query(&AuditFilter {
        action: Some("registry_reloaded".into()),
        ..AuditFilter::default()
    });
    assert_eq!(by_action[0].category, AuditCategory::System);
}

#[test]
fn retention_bound_drops_oldest() {
    let log = AuditLog::new(AuditConfig {
        max_entries: 3,
        retention: Duration::from_secs(60),
    });
    for n in 0..5 {
        log.system_event(&format!("event-{n}"), json!({}));
    }
    let actions: Vec<_> = log.recent(10).into_iter().map(|e| e.action).collect();
    assert_eq!(actions, vec!["event-4", "event-3", "event-2"]);
}

#[test]
fn prune_removes_aged_entries() {
    let log = AuditLog::default();
    let mut old = AuditEntry::new(AuditCategory::System, AuditLevel::Info, "old", "system");
    old.timestamp = Utc::now() - chrono::Duration::days(40);
    log.record(old);
    log.system_event("fresh", json!({}));

    assert_eq!(log.prune_expired(), 1);
    assert_eq!(log.len(), 1);
    assert_eq!(log.recent(1)[0].action, "fresh");
}

#[test]
fn sink_failures_do_not_reach_callers() {
    let log = AuditLog::default();
    let failing = Arc::new(FailingSink {
        calls: AtomicUsize::new(0),
    });
    log.add_sink(failing.clone());
    log.add_sink(Arc::new(PanickingSink));

    log.authentication(admin(), "token_verified", true, json!({}));
    log.authentication(admin(), "token_verified", true, json!({}));
    log.flush().unwrap();

    assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    assert_eq!(log.len(), 2);
}

#[test]
fn slow_sink_does_not_delay_appends() {
    let log = AuditLog::default();
    let sink = Arc::new(SlowSink {
        delay: Duration::from_millis(200),
        written: AtomicUsize::new(0),
    });
    log.add_sink(sink.clone());

    let started = std::time::Instant::now();
    for _ in 0..3 {
        log.authorization(admin(), "view_admins", "permission", None, true, json!({}));
    }
    assert!(started.elapsed() < Duration::from_millis(150));
    assert_eq!(log.len(), 3);

    log.flush().unwrap();
    assert_eq!(sink.written.load(Ordering::SeqCst), 3);
}

#[test]
fn flush_without_sinks_is_a_no_op() {
    let log = AuditLog::default();
    log.system_event("startup", json!({}));
    assert!(log.flush().is_ok());
}

#[test]
fn stats_count_levels_categories_and_failures() {
    let log = AuditLog::default();
    log.authorization(admin(), "a", "permission", None, true, json!({}));
    log.authorization(admin(), "b", "permission", None, false, json!({}));
    log.data_modification(admin(), "update", "teacher", Some("7".into()), json!({}));

    let stats = log.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.by_category.get("authorization"), Some(&2));
    assert_eq!(stats.by_category.get("data_modification"), Some(&1));
    assert_eq!(stats.by_level.get("warning"), Some(&1));
}

#[tokio::test]
async fn subscribers_receive_appended_entries() {
    let log = AuditLog::default();
    let mut rx = log.subscribe();
    log.data_access(admin(), "teacher", Some("3".into()));

    let entry = rx.recv().await.unwrap();
    assert_eq!(entry.category, AuditCategory::DataAccess);
    assert_eq!(entry.resource_id.as_deref(), Some("3"));
}
