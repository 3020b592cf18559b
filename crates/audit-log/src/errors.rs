use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode audit entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("sink '{sink}' rejected entry: {message}")]
    Sink { sink: String, message: String },
}
