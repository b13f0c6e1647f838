use thiserror::Error;

/// Trace pipeline error types
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    #[error("Frame field {field} is not finite")]
    NonFiniteField { field: &'static str },

    #[error("Schema mismatch: no column matches {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("Row {row}: {reason}")]
    RowParse { row: usize, reason: String },

    #[error("No advertised device matches '{identifier}'")]
    DeviceNotFound { identifier: String },

    #[error("Link error: {0}")]
    Link(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for trace operations
pub type Result<T> = std::result::Result<T, TraceError>;

impl TraceError {
    pub fn link(msg: impl Into<String>) -> Self {
        TraceError::Link(msg.into())
    }

    /// A single bad frame: skip it and keep polling
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            TraceError::MalformedFrame { .. } | TraceError::NonFiniteField { .. }
        )
    }

    /// Errors a caller can report and carry on from (the process keeps running)
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TraceError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_lists_columns() {
        let err = TraceError::SchemaMismatch {
            missing: vec!["lat".to_string(), "millis".to_string()],
        };
        assert_eq!(err.to_string(), "Schema mismatch: no column matches lat, millis");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_frame_errors() {
        assert!(TraceError::NonFiniteField { field: "x_pos" }.is_frame_error());
        assert!(TraceError::MalformedFrame { expected: 48, actual: 40 }.is_frame_error());
        assert!(!TraceError::link("gone").is_frame_error());
    }

    #[test]
    fn test_io_is_not_recoverable() {
        let err: TraceError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(!err.is_recoverable());
    }
}
