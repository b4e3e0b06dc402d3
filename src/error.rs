//! Failure outcomes of a judging run.

use thiserror::Error;

/// Why `judge` did not hand back a completed submission
///
/// A wrong answer is not an error: it is a completed submission with a
/// `Fail` verdict. Plagiarism check failures never surface here either.
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("Problem not found")]
    ProblemNotFound,

    #[error("Language not supported")]
    UnsupportedLanguage(String),

    /// Carries everything the compiler wrote to stderr
    #[error("Compilation error")]
    CompileFailure { stderr: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl JudgeError {
    /// HTTP status class the caller should see
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ProblemNotFound => 404,
            // unhandled failures are reported as bad requests too
            Self::UnsupportedLanguage(_)
            | Self::CompileFailure { .. }
            | Self::Database(_)
            | Self::Internal(_) => 400,
        }
    }

    /// Failures the orchestrator did not plan for, which may leave the record unfinished
    pub fn is_unhandled(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Internal(_))
    }

    /// Text stored in the submission's error log
    pub fn error_log(&self) -> String {
        match self {
            Self::CompileFailure { stderr } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_and_status_codes() {
        assert_eq!(JudgeError::ProblemNotFound.to_string(), "Problem not found");
        assert_eq!(JudgeError::ProblemNotFound.http_status(), 404);

        let unsupported = JudgeError::UnsupportedLanguage("cobol".to_string());
        assert_eq!(unsupported.to_string(), "Language not supported");
        assert_eq!(unsupported.http_status(), 400);
        assert!(!unsupported.is_unhandled());
    }

    #[test]
    fn test_compile_failure_logs_compiler_output() {
        let err = JudgeError::CompileFailure {
            stderr: "main.cpp:1:1: error: expected ';'".to_string(),
        };
        assert_eq!(err.to_string(), "Compilation error");
        assert_eq!(err.error_log(), "main.cpp:1:1: error: expected ';'");
    }

    #[test]
    fn test_internal_errors_are_unhandled() {
        let err = JudgeError::from(anyhow::anyhow!("disk full"));
        assert!(err.is_unhandled());
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.error_log(), "disk full");
    }
}
