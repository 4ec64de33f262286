//! Run-level and per-table error reporting.

use tursotap_types::error::{ExtractError, Phase};

/// The configuration is invalid; no table was started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Configuration validation failed:{}", bullet_list(.errors))]
pub struct ConfigurationError {
    pub errors: Vec<String>,
}

fn bullet_list(errors: &[String]) -> String {
    errors.iter().map(|e| format!("\n  - {e}")).collect()
}

/// Why one table ended `FAILED`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("table '{table}' failed during {phase}: {error}")]
pub struct TableFailure {
    pub table: String,
    pub phase: Phase,
    #[source]
    pub error: ExtractError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_lists_every_problem() {
        let err = ConfigurationError {
            errors: vec!["a is wrong".into(), "b is wrong".into()],
        };
        assert_eq!(
            err.to_string(),
            "Configuration validation failed:\n  - a is wrong\n  - b is wrong"
        );
    }

    #[test]
    fn configuration_error_converts_into_anyhow() {
        let err: anyhow::Error = ConfigurationError {
            errors: vec!["tables is empty".into()],
        }
        .into();
        assert_eq!(err.chain().count(), 1);
        assert!(err.downcast_ref::<ConfigurationError>().is_some());
        assert_eq!(
            err.to_string(),
            "Configuration validation failed:\n  - tables is empty"
        );
    }

    #[test]
    fn table_failure_names_table_phase_and_cause() {
        let failure = TableFailure {
            table: "orders".into(),
            phase: Phase::Discovering,
            error: ExtractError::TableNotFound {
                table: "orders".into(),
            },
        };
        assert_eq!(
            failure.to_string(),
            "table 'orders' failed during DISCOVERING: table 'orders' not found"
        );
    }
}
