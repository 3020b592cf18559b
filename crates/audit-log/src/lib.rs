pub mod api;
pub mod config;
pub mod errors;
pub mod model;
pub mod sink;
mod writer;

pub use api::AuditLog;
pub use config::AuditConfig;
pub use errors::AuditError;
pub use model::{Actor, AuditCategory, AuditEntry, AuditFilter, AuditLevel, AuditStats};
pub use sink::{AuditSink, JsonLinesSink};

#[cfg(test)]
mod tests;
