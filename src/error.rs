use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum PaymentError {
    #[error("{entity} {id} not found")]
    #[diagnostic(code(fee_reminder::not_found))]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid state: {0}")]
    #[diagnostic(
        code(fee_reminder::invalid_state),
        help("a receipt can only be recorded for a payment that is already paid")
    )]
    InvalidState(String),

    #[error("Payment for parent {parent_id} in {month} already exists")]
    #[diagnostic(code(fee_reminder::duplicate))]
    Duplicate { parent_id: u64, month: String },

    #[error("Validation error: {0}")]
    #[diagnostic(code(fee_reminder::validation))]
    ValidationError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(fee_reminder::config))]
    ConfigError(#[from] ::config::ConfigError),

    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),

    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Failure to deliver a single reminder.
///
/// Never escapes the dispatcher: each one is logged and recorded in the
/// batch report, and the batch carries on with the next recipient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("send timed out after {0} ms")]
    Timeout(u64),
    #[error("parent {0} has no chat address")]
    NoChatAddress(u64),
    #[error("cannot build reminder: {0}")]
    Unresolvable(String),
}
