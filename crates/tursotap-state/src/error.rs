//! Errors raised while loading or saving tap state.

/// Failure of a [`StateBackend`](crate::StateBackend) call.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Reading, writing or renaming the state file or its directory failed.
    #[error("state file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON state document does not have the `{"bookmarks": {..}}` shape.
    #[error("state file is not a valid bookmark document: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored bookmark row has an unknown type tag or unparsable value.
    #[error("corrupt bookmark for table '{table}': {reason}")]
    CorruptBookmark { table: String, reason: String },

    #[error("state backend lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_bookmark_names_table() {
        let err = StateError::CorruptBookmark {
            table: "events".into(),
            reason: "unknown value type 'blob'".into(),
        };
        assert_eq!(
            err.to_string(),
            "corrupt bookmark for table 'events': unknown value type 'blob'"
        );
    }

    #[test]
    fn json_errors_convert() {
        let inner = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StateError = inner.into();
        assert!(err.to_string().starts_with("state file is not a valid bookmark document"));
    }
}
