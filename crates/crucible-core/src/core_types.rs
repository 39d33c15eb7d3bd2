//! Result types shared across the engine
//!
//! These types define the contract between the sandbox and its callers. A
//! completed execution, including one whose program crashed, exited nonzero
//! or timed out, is an `ExecutionRecord`. Infrastructure failures (the
//! container could not be reached, the file could not be written) are errors,
//! and serialize to a distinct `{"error": ...}` shape whose discriminator is
//! the absence of `execution_id`.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::errors::SandboxError;

/// Structured outcome of running one program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique token for correlation and logging.
    pub execution_id: String,
    /// Canonical language name, post alias resolution.
    pub language: String,
    pub filename: String,
    /// Captured standard output; empty string when the program produced none.
    pub stdout: String,
    /// Captured standard error; empty string when the program produced none.
    pub stderr: String,
    pub exit_code: i64,
    /// Derived: `exit_code == 0`.
    pub success: bool,
}

/// Wire shape for a run: either a completed record or an infrastructure
/// failure. Serializes to the record's fields or to `{"error": "..."}`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RunOutcome {
    Completed(ExecutionRecord),
    Failed { error: String },
}

impl From<Result<ExecutionRecord, SandboxError>> for RunOutcome {
    fn from(result: Result<ExecutionRecord, SandboxError>) -> Self {
        match result {
            Ok(record) => RunOutcome::Completed(record),
            Err(err) => RunOutcome::Failed {
                error: err.to_string(),
            },
        }
    }
}

/// Best-effort metadata for a file known to live in an environment. The
/// container filesystem is the source of truth; this is a cache.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: String,
    pub size: Option<usize>,
    pub last_modified: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(exit_code: i64) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: "test-id".to_string(),
            language: "python".to_string(),
            filename: "program.py".to_string(),
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            exit_code,
            success: exit_code == 0,
        }
    }

    #[test]
    fn completed_outcome_serializes_record_fields() {
        let outcome = RunOutcome::Completed(record(0));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["execution_id"], "test-id");
        assert_eq!(json["language"], "python");
        assert_eq!(json["stdout"], "hello\n");
        assert_eq!(json["stderr"], "");
        assert_eq!(json["exit_code"], 0);
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failed_outcome_serializes_to_error_shape() {
        let outcome: RunOutcome =
            Err::<ExecutionRecord, _>(SandboxError::UnsupportedLanguage("bogus-lang".into()))
                .into();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["error"], "Language not supported: bogus-lang");
        // Absence of execution_id discriminates the failure shape
        assert!(json.get("execution_id").is_none());
    }
}
