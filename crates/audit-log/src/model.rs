use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schoolgate_core_types::{PrincipalId, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an audit entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
    Security,
}

impl AuditLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditLevel::Info => "info",
            AuditLevel::Warning => "warning",
            AuditLevel::Error => "error",
            AuditLevel::Security => "security",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Authentication,
    Authorization,
    DataAccess,
    DataModification,
    System,
    Security,
}

impl AuditCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditCategory::Authentication => "authentication",
            AuditCategory::Authorization => "authorization",
            AuditCategory::DataAccess => "data_access",
            AuditCategory::DataModification => "data_modification",
            AuditCategory::System => "system",
            AuditCategory::Security => "security",
        }
    }
}

/// Who performed the audited action.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: PrincipalId,
    pub role: Role,
}

/// Single append-only audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub principal_id: Option<PrincipalId>,
    pub role: Option<Role>,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    pub level: AuditLevel,
    pub category: AuditCategory,
    pub success: bool,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        category: AuditCategory,
        level: AuditLevel,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_id: None,
            role: None,
            action: action.into(),
            resource: resource.into(),
            resource_id: None,
            level,
            category,
            success: true,
            details: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn actor(mut self, actor: Option<Actor>) -> Self {
        self.principal_id = actor.map(|a| a.id);
        self.role = actor.map(|a| a.role);
        self
    }

    pub fn resource_id(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Selection criteria for [`crate::AuditLog::query`]. Unset fields match everything.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub principal_id: Option<PrincipalId>,
    pub action: Option<String>,
    pub level: Option<AuditLevel>,
    pub category: Option<AuditCategory>,
    pub success: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Keep only the newest `limit` matches.
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(principal) = self.principal_id {
            if entry.principal_id != Some(principal) {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if self.level.is_some_and(|level| entry.level != level) {
            return false;
        }
        if self.category.is_some_and(|category| entry.category != category) {
            return false;
        }
        if self.success.is_some_and(|success| entry.success != success) {
            return false;
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.timestamp > until) {
            return false;
        }
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: usize,
    pub failures: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}
