//! Error taxonomy for the generation pipeline.
//!
//! Only genuinely unexpected conditions are surfaced as errors. Expected
//! outcomes — a rewrite loop that runs out of attempts, an assessment
//! response that fails to parse — are modeled as values by the components
//! that own them, never as variants here.

use thiserror::Error;

/// Errors produced by the generation pipeline and its components.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The daily cost ceiling has been reached.
    ///
    /// Non-retryable for the remainder of the UTC day. Signaled before a
    /// rate-limit slot is occupied so a rejected call never holds capacity.
    #[error("daily cost budget exceeded: spent ${spent:.4} of ${limit:.4}")]
    BudgetExceeded {
        /// Cost accumulated so far today (USD).
        spent: f64,
        /// Configured daily ceiling (USD).
        limit: f64,
    },

    /// The upstream text-generation service failed.
    ///
    /// Propagated unchanged; retry policy belongs to the caller, since
    /// retryability depends on upstream status semantics not modeled here.
    #[error("upstream generation call failed: {message}")]
    Upstream {
        /// Upstream-provided failure description.
        message: String,
    },

    /// A content brief failed structural validation.
    #[error("invalid content brief: {reason}")]
    InvalidBrief {
        /// First validation problem encountered.
        reason: String,
    },

    /// Waiting for a rate-limit slot exceeded the caller's deadline.
    #[error("timed out after {waited_ms}ms waiting for a rate-limit slot")]
    AcquireTimeout {
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },

    /// The configuration layer could not produce valid settings.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GenerationError {
    /// Create an upstream error from any displayable source.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Whether the error is worth retrying with the same inputs.
    ///
    /// Budget exhaustion and invalid briefs will fail identically until the
    /// day rolls over or the brief changes; upstream failures may be
    /// transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::Upstream { .. } | GenerationError::AcquireTimeout { .. }
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exceeded_is_not_retryable() {
        let err = GenerationError::BudgetExceeded {
            spent: 5.0,
            limit: 5.0,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_upstream_is_retryable() {
        let err = GenerationError::upstream("503 service unavailable");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_messages_include_amounts() {
        let err = GenerationError::BudgetExceeded {
            spent: 5.25,
            limit: 5.0,
        };
        let text = err.to_string();
        assert!(text.contains("5.2500"));
        assert!(text.contains("5.0000"));
    }
}
