//! The per-case result record, as written into the result artifact.

use serde::Serialize;

use crate::supervisor::ExecutionOutcome;

/// One case's judged outcome. Field names and shapes mirror the documented
/// `execute_message.json` layout exactly; this struct is the wire format, not an
/// internal convenience type, so it must not grow fields that layout doesn't already
/// have.
#[derive(Debug, Clone, Serialize)]
pub struct VerdictRecord {
    pub test_name: String,
    pub status: i32,
    pub time_used: u64,
    pub memory_used: u64,
    pub time_limit_exceeded: bool,
    pub memory_limit_exceeded: bool,
    pub runtime_error: bool,
    pub system_error: bool,
    pub error_message: String,
    pub output: String,
}

impl VerdictRecord {
    /// Build a verdict record from a supervisor outcome, attaching the captured output
    /// and the case's name.
    pub fn from_outcome(test_name: String, outcome: ExecutionOutcome, output: String) -> VerdictRecord {
        VerdictRecord {
            test_name,
            status: outcome.status,
            time_used: outcome.time_used,
            memory_used: outcome.memory_used,
            time_limit_exceeded: outcome.time_limit_exceeded,
            memory_limit_exceeded: outcome.memory_limit_exceeded,
            runtime_error: outcome.runtime_error,
            system_error: outcome.system_error,
            error_message: outcome.error_message,
            output,
        }
    }

    /// Build a verdict record for a case that failed before it could even be
    /// supervised (fork or pipe-creation failure).
    pub fn system_error(test_name: String, message: String) -> VerdictRecord {
        VerdictRecord {
            test_name,
            status: -1,
            time_used: 0,
            memory_used: 0,
            time_limit_exceeded: false,
            memory_limit_exceeded: false,
            runtime_error: false,
            system_error: true,
            error_message: message,
            output: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_error_record_shape() {
        let record = VerdictRecord::system_error("case1".to_owned(), "fork failed".to_owned());
        assert!(record.system_error);
        assert!(!record.runtime_error);
        assert_eq!(record.test_name, "case1");
    }

    #[test]
    fn test_serializes_with_documented_field_names() {
        let record = VerdictRecord::system_error("case1".to_owned(), "boom".to_owned());
        let json = serde_json::to_value(&record).unwrap();
        for field in &["test_name", "status", "time_used", "memory_used",
                        "time_limit_exceeded", "memory_limit_exceeded",
                        "runtime_error", "system_error", "error_message", "output"] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
    }
}
