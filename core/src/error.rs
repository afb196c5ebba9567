//! Error types for the reservation and transaction lifecycle.
//!
//! The taxonomy is closed: callers match on variants, never on message text.

use crate::types::{EventId, TransactionStatus};
use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Entity kinds that can be reported as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// A user account
    User,
    /// An event
    Event,
    /// A transaction
    Transaction,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Event => "event",
            Self::Transaction => "transaction",
        })
    }
}

/// Operations of the lifecycle, named in `InvalidStateTransition` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Reserve tickets against an event
    Reserve,
    /// Attach payment proof
    UploadProof,
    /// Cancel a pending transaction
    Cancel,
    /// Organizer verification of the payment
    Verify,
    /// Cancel an event
    CancelEvent,
}

impl LifecycleAction {
    /// The action that moves a transaction into `next`.
    ///
    /// Stores use this to label compare-and-set failures. Re-entering
    /// `pending` re-acquires a reservation, hence `Reserve`.
    #[must_use]
    pub const fn toward(next: TransactionStatus) -> Self {
        match next {
            TransactionStatus::Pending => Self::Reserve,
            TransactionStatus::WaitingVerification => Self::UploadProof,
            TransactionStatus::Success => Self::Verify,
            TransactionStatus::Cancelled => Self::Cancel,
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reserve => "reserve",
            Self::UploadProof => "upload proof",
            Self::Cancel => "cancel",
            Self::Verify => "verify",
            Self::CancelEvent => "cancel event",
        })
    }
}

/// The state an illegal transition was attempted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromState {
    /// A transaction in the given status
    Transaction(TransactionStatus),
    /// An event in the given status
    Event(crate::types::EventStatus),
}

impl fmt::Display for FromState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(status) => write!(f, "transaction {status}"),
            Self::Event(status) => write!(f, "event {status}"),
        }
    }
}

/// User-visible category of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The referenced entity does not exist
    NotFound,
    /// The caller may not perform the operation
    Forbidden,
    /// The operation conflicts with current state
    Conflict,
    /// The request itself is malformed
    Validation,
    /// Internal fault; details are never exposed
    Internal,
}

/// Every failure the engine can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ═══════════════════════════════════════════════════════════
    // Caller errors
    // ═══════════════════════════════════════════════════════════

    /// User, event or transaction absent.
    #[error("{resource} not found")]
    NotFound {
        /// What was missing
        resource: Resource,
    },

    /// Caller lacks ownership or role.
    #[error("Unauthorized")]
    Unauthorized,

    /// Reservation would push `tickets_sold` past capacity.
    #[error("Capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded {
        /// Tickets requested
        requested: u32,
        /// Tickets available at the time of the attempt
        available: u32,
    },

    /// Operation not legal from the current status.
    #[error("Cannot {action} from {from}")]
    InvalidStateTransition {
        /// Current state
        from: FromState,
        /// Attempted operation
        action: LifecycleAction,
    },

    /// Bad quantity, payment method, empty proof, paging...
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// What was wrong
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Internal faults
    // ═══════════════════════════════════════════════════════════

    /// Transaction code collided with an existing one.
    #[error("Duplicate transaction code")]
    DuplicateCode,

    /// Release would take `tickets_sold` below zero.
    #[error("Inventory underflow on event {event_id}: release {requested}, sold {sold}")]
    InventoryUnderflow {
        /// Event whose counter would underflow
        event_id: EventId,
        /// Tickets the caller tried to release
        requested: u32,
        /// Counter value at the time
        sold: u32,
    },

    /// Storage I/O failed.
    #[error("Storage fault: {0}")]
    StorageFault(String),
}

impl EngineError {
    /// Shorthand for [`EngineError::NotFound`].
    #[must_use]
    pub const fn not_found(resource: Resource) -> Self {
        Self::NotFound { resource }
    }

    /// Shorthand for [`EngineError::InvalidInput`].
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Illegal transition from a transaction status.
    #[must_use]
    pub const fn transaction_transition(from: TransactionStatus, action: LifecycleAction) -> Self {
        Self::InvalidStateTransition {
            from: FromState::Transaction(from),
            action,
        }
    }

    /// Returns `true` for faults worth retrying (storage I/O only).
    ///
    /// # Examples
    ///
    /// ```
    /// # use boxoffice_core::EngineError;
    /// assert!(EngineError::StorageFault("connection reset".into()).is_transient());
    /// assert!(!EngineError::Unauthorized.is_transient());
    /// ```
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StorageFault(_))
    }

    /// User-visible category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Unauthorized => ErrorCategory::Forbidden,
            Self::CapacityExceeded { .. } | Self::InvalidStateTransition { .. } => {
                ErrorCategory::Conflict
            }
            Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::DuplicateCode | Self::InventoryUnderflow { .. } | Self::StorageFault(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Fixed caller-safe message; internal faults never leak storage details.
    ///
    /// # Examples
    ///
    /// ```
    /// # use boxoffice_core::EngineError;
    /// let err = EngineError::StorageFault("relation \"events\" does not exist".into());
    /// assert_eq!(err.public_message(), "An internal error occurred");
    /// ```
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::NotFound { resource } => match resource {
                Resource::User => "User not found",
                Resource::Event => "Event not found",
                Resource::Transaction => "Transaction not found",
            },
            Self::Unauthorized => "You are not allowed to access this transaction",
            Self::CapacityExceeded { .. } => "Requested tickets exceed remaining capacity",
            Self::InvalidStateTransition { .. } => {
                "This operation is not allowed in the current status"
            }
            Self::InvalidInput { .. } => "Invalid request",
            Self::DuplicateCode | Self::InventoryUnderflow { .. } | Self::StorageFault(_) => {
                "An internal error occurred"
            }
        }
    }
}
