//! Error types for the audit pipeline.
//!
//! Only the fatal, stage-aborting conditions get their own variants.
//! Per-image and per-report failures never surface as errors: they are
//! absorbed into sentinel values or skipped-report log lines.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Corpus directory '{}' does not exist. Run `biasaudit generate` first.", path.display())]
    MissingCorpus { path: PathBuf },

    #[error("Audit table '{}' was not found. Run `biasaudit analyze` first to generate the data.", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("Invalid prompt framework '{}': {reason}", path.display())]
    PromptFramework { path: PathBuf, reason: String },

    #[error("Malformed audit table '{}': {source}", path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_prerequisite_stage() {
        let err = AuditError::MissingCorpus {
            path: PathBuf::from("audit_results"),
        };
        assert!(err.to_string().contains("audit_results"));
        assert!(err.to_string().contains("biasaudit generate"));

        let err = AuditError::MissingArtifact {
            path: PathBuf::from("bias_audit_report.csv"),
        };
        assert!(err.to_string().contains("biasaudit analyze"));
    }

    #[test]
    fn test_framework_error_carries_reason() {
        let err = AuditError::PromptFramework {
            path: PathBuf::from("prompts.json"),
            reason: "expected an object".to_string(),
        };
        assert!(!err.to_string().contains("Run `biasaudit"));
        assert!(err.to_string().contains("expected an object"));
    }
}
