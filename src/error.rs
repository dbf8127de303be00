//! Error types for the bLUSD bond engine.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors are
//! grouped into the kinds a caller has to react to differently, see
//! [`ErrorKind`].

use thiserror::Error;

/// Result type alias for bond engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Inadmissible event or parameter; non-fatal, state unchanged
    Validation,
    /// A required chain handle or selection is not available yet
    DependencyUnavailable,
    /// A submitted transaction failed or reverted
    TransactionFailure,
    /// A formula received out-of-domain input
    Computation,
    /// Network/provider error while refreshing data
    Synchronization,
    /// Serialization, configuration or internal errors
    Internal,
}

/// Main error type for the bond engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Event not present in the transition table for the current view
    #[error("Event {event} is not allowed in view {view}")]
    InvalidTransition {
        /// Current view
        view: String,
        /// Rejected event
        event: String,
    },

    /// Event payload does not fit the current view
    #[error("Invalid payload for {event} in view {view}: {reason}")]
    InvalidPayload {
        /// Current view
        view: String,
        /// Event name
        event: String,
        /// Reason for rejection
        reason: String,
    },

    /// A transaction of the same category is already pending
    #[error("A {0} transaction is already in flight")]
    ActionInFlight(String),

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Dependency Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Required chain handle or data not resolved yet
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Bond not found in the current snapshot
    #[error("Bond not found: {0}")]
    BondNotFound(String),

    // ═══════════════════════════════════════════════════════════════════
    // Transaction Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Submission or confirmation of a transaction failed
    #[error("{action} transaction failed: {reason}")]
    TransactionFailure {
        /// Action category that failed
        action: String,
        /// Failure reason reported by the provider
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Computation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Division by zero in a formula
    #[error("Division by zero in {operation}")]
    DivisionByZero {
        /// Operation that divided by zero
        operation: String,
    },

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Input violates a structural precondition of a formula
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Result is not a finite number (e.g. infinite horizon)
    #[error("Not computable: {0}")]
    NotComputable(String),

    // ═══════════════════════════════════════════════════════════════════
    // Synchronization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// A provider call failed
    #[error("Chain call {call} failed: {reason}")]
    ChainCall {
        /// Provider call name
        call: String,
        /// Error details
        reason: String,
    },

    /// Refresh of the session snapshot failed
    #[error("Synchronization failed: {0}")]
    SynchronizationFailure(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a division-by-zero error
    pub fn division_by_zero(operation: impl Into<String>) -> Self {
        Error::DivisionByZero {
            operation: operation.into(),
        }
    }

    /// Shorthand for an overflow error
    pub fn overflow(operation: impl Into<String>) -> Self {
        Error::Overflow {
            operation: operation.into(),
        }
    }

    /// Shorthand for a failed provider call
    pub fn chain_call(call: impl Into<String>, reason: impl ToString) -> Self {
        Error::ChainCall {
            call: call.into(),
            reason: reason.to_string(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidTransition { .. }
            | Error::InvalidPayload { .. }
            | Error::ActionInFlight(_)
            | Error::InvalidParameter { .. } => ErrorKind::Validation,
            Error::DependencyUnavailable(_) | Error::BondNotFound(_) => {
                ErrorKind::DependencyUnavailable
            }
            Error::TransactionFailure { .. } => ErrorKind::TransactionFailure,
            Error::DivisionByZero { .. }
            | Error::Overflow { .. }
            | Error::InvalidState(_)
            | Error::NotComputable(_) => ErrorKind::Computation,
            Error::ChainCall { .. } | Error::SynchronizationFailure(_) => {
                ErrorKind::Synchronization
            }
            Error::Config(_)
            | Error::Serialization(_)
            | Error::Deserialization(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the session can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::DependencyUnavailable
                | ErrorKind::TransactionFailure
                | ErrorKind::Synchronization
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvalidState(_) | Error::Internal(_) | Error::Overflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Validation errors: 1xxx
            Error::InvalidTransition { .. } => 1001,
            Error::InvalidPayload { .. } => 1002,
            Error::ActionInFlight(_) => 1003,
            Error::InvalidParameter { .. } => 1004,

            // Dependency errors: 2xxx
            Error::DependencyUnavailable(_) => 2001,
            Error::BondNotFound(_) => 2002,

            // Transaction errors: 3xxx
            Error::TransactionFailure { .. } => 3001,

            // Computation errors: 4xxx
            Error::DivisionByZero { .. } => 4001,
            Error::Overflow { .. } => 4002,
            Error::InvalidState(_) => 4003,
            Error::NotComputable(_) => 4004,

            // Synchronization errors: 5xxx
            Error::ChainCall { .. } => 5001,
            Error::SynchronizationFailure(_) => 5002,

            // Internal errors: 9xxx
            Error::Config(_) => 9001,
            Error::Serialization(_) => 9002,
            Error::Deserialization(_) => 9003,
            Error::Internal(_) => 9004,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique() {
        let codes = vec![
            Error::InvalidTransition { view: "".into(), event: "".into() }.code(),
            Error::ActionInFlight("".into()).code(),
            Error::DependencyUnavailable("".into()).code(),
            Error::TransactionFailure { action: "".into(), reason: "".into() }.code(),
            Error::division_by_zero("").code(),
            Error::NotComputable("".into()).code(),
            Error::chain_call("", "").code(),
            Error::Internal("".into()).code(),
        ];

        let mut unique_codes = codes.clone();
        unique_codes.sort();
        unique_codes.dedup();

        assert_eq!(codes.len(), unique_codes.len(), "Error codes must be unique");
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidTransition {
            view: "Creating".into(),
            event: "CancelPressed".into(),
        };
        assert!(err.to_string().contains("Creating"));
        assert!(err.to_string().contains("CancelPressed"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Error::ActionInFlight("Create".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::division_by_zero("premium").kind(), ErrorKind::Computation);
        assert_eq!(Error::chain_call("get_stats", "timeout").kind(), ErrorKind::Synchronization);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ActionInFlight("Swap".into()).is_recoverable());
        assert!(Error::SynchronizationFailure("offline".into()).is_recoverable());
        assert!(!Error::division_by_zero("floor").is_recoverable());
    }

    #[test]
    fn test_is_critical() {
        assert!(Error::InvalidState("test".into()).is_critical());
        assert!(Error::overflow("mul").is_critical());
        assert!(!Error::BondNotFound("1".into()).is_critical());
    }
}
