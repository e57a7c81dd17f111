//! Error tracing extensions
//!
//! Transport failures are logged with their code and source chain before
//! being turned into error output events.

use std::error::Error as StdError;

use crate::types::AgentError;

/// Extension trait for adding tracing context to errors
pub trait ErrorTraceExt {
    /// Log error with full context including error code, retryable status, and error chain
    fn trace_error(&self) -> &Self;
}

impl ErrorTraceExt for AgentError {
    fn trace_error(&self) -> &Self {
        let error_code = self.error_code();

        let mut error_chain = Vec::new();
        let mut current_source = self.source();
        while let Some(source) = current_source {
            error_chain.push(source.to_string());
            current_source = source.source();
        }

        if self.is_client_error() {
            tracing::warn!(
                error = %self,
                error_code = error_code.code(),
                error_code_name = ?error_code,
                "Request rejected"
            );
        } else {
            tracing::error!(
                error = %self,
                error_code = error_code.code(),
                error_code_name = ?error_code,
                is_retryable = self.is_retryable(),
                error_chain_len = error_chain.len(),
                error_chain = ?error_chain,
                "Error occurred with full context"
            );
        }
        self
    }
}

/// Extension trait for Result types
pub trait ResultTraceExt<T> {
    /// Convert the error to AgentError and log it with context
    fn trace_context(self) -> Result<T, AgentError>;
}

impl<T, E> ResultTraceExt<T> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
    AgentError: From<E>,
{
    fn trace_context(self) -> Result<T, AgentError> {
        self.map_err(|e| {
            let agent_error = AgentError::from(e);
            agent_error.trace_error();
            agent_error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_error_returns_self() {
        let error = AgentError::spawn_failed("codex", "No such file or directory");
        assert!(matches!(error.trace_error(), AgentError::SpawnFailed { .. }));
    }

    #[test]
    fn test_result_trace_context_converts() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "stdin closed",
        ));
        assert!(matches!(result.trace_context(), Err(AgentError::Io(_))));
    }
}
