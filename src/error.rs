use thiserror::Error;

#[derive(Error, Debug)]
pub enum CurveError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("nothing to curve: no student has a complete raw final (roster size {roster_size})")]
    NoEligibleStudents { roster_size: usize },

    #[error("{context}: {source}")]
    TransientIo {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("row rejected for student {student_id}: {message}")]
    RowRejected { student_id: String, message: String },

    #[error("invalid session state: {0}")]
    InvalidState(String),
}

pub type CurveResult<T> = Result<T, CurveError>;

impl CurveError {
    pub fn config(message: impl Into<String>) -> Self {
        CurveError::Configuration(message.into())
    }

    pub fn io(context: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Self {
        let context = context.into();
        move |source| CurveError::TransientIo { context, source }
    }

    /// Error code used in sidecar responses.
    pub fn code(&self) -> &'static str {
        match self {
            CurveError::Configuration(_) => "config_error",
            CurveError::NoEligibleStudents { .. } => "no_eligible_students",
            CurveError::TransientIo { .. } => "db_transient",
            CurveError::RowRejected { .. } => "row_rejected",
            CurveError::InvalidState(_) => "bad_state",
        }
    }

    /// Safe to retry with the same inputs. A rejected row fails the same way
    /// every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CurveError::TransientIo { .. })
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CurveError::NoEligibleStudents { roster_size } => {
                Some(serde_json::json!({ "rosterSize": roster_size }))
            }
            CurveError::TransientIo { context, .. } => {
                Some(serde_json::json!({ "context": context, "retryable": true }))
            }
            CurveError::RowRejected { student_id, .. } => {
                Some(serde_json::json!({ "studentId": student_id }))
            }
            _ => None,
        }
    }
}
