//! Domain types for the box office engine.
//!
//! Identifiers, money, statuses, and the two entities the engine works on:
//! [`Event`] (the inventory owner) and [`Transaction`] (a purchase attempt).

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl $name {
            /// Create the identifier from its raw database value
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Get the raw database value
            #[must_use]
            pub const fn value(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a user (buyer or organizer)
    UserId
);
numeric_id!(
    /// Identifier of an event
    EventId
);
numeric_id!(
    /// Surrogate identifier of a transaction
    TransactionId
);

/// Human-shareable transaction code (e.g. `TRX-20250101-123456`).
///
/// Globally unique; distinct from the internal numeric [`TransactionId`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionCode(String);

impl TransactionCode {
    /// Wrap an already generated code
    #[must_use]
    pub const fn new(code: String) -> Self {
        Self(code)
    }

    /// The code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a transaction as a caller supplies it: numeric id or code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionRef {
    /// Internal surrogate id
    Id(TransactionId),
    /// Human-shareable code
    Code(TransactionCode),
}

impl TransactionRef {
    /// Parse caller input. All-digit input is an id, anything else a code.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] for empty input or an id that
    /// does not fit in an `i64`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EngineError::invalid_input("transaction reference is empty"));
        }

        if input.bytes().all(|b| b.is_ascii_digit()) {
            let id = input
                .parse::<i64>()
                .map_err(|_| EngineError::invalid_input("transaction id is out of range"))?;
            return Ok(Self::Id(TransactionId(id)));
        }

        Ok(Self::Code(TransactionCode(input.to_string())))
    }
}

impl From<TransactionId> for TransactionRef {
    fn from(id: TransactionId) -> Self {
        Self::Id(id)
    }
}

impl From<TransactionCode> for TransactionRef {
    fn from(code: TransactionCode) -> Self {
        Self::Code(code)
    }
}

// ============================================================================
// Money Value Object (minor units to avoid floating point errors)
// ============================================================================

/// Non-negative amount of money in minor units (cents)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Multiplies by a ticket quantity, `None` on overflow
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Statuses and enumerations
// ============================================================================

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Stable lowercase form used for storage and display
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(EngineError::invalid_input(format!(
                        concat!("unknown ", $what, " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum!(
    /// Role of a user account
    Role, "role" {
        /// Ticket buyer
        User => "user",
        /// Event organizer
        Organizer => "organizer",
    }
);

string_enum!(
    /// Event lifecycle status
    EventStatus, "event status" {
        /// Open for sales
        Active => "active",
        /// Cancelled by its organizer
        Cancelled => "cancelled",
        /// Event has taken place
        Completed => "completed",
    }
);

string_enum!(
    /// Transaction lifecycle status
    ///
    /// ```text
    /// (start) --create--> pending --upload proof--> waiting_verification --verify--> success
    ///                        └--cancel--> cancelled
    /// ```
    TransactionStatus, "transaction status" {
        /// Created, tickets reserved, awaiting proof of payment
        Pending => "pending",
        /// Proof uploaded, awaiting organizer verification
        WaitingVerification => "waiting_verification",
        /// Verified by the organizer; reservation is permanent
        Success => "success",
        /// Cancelled by the buyer; reservation released
        Cancelled => "cancelled",
    }
);

string_enum!(
    /// Recognized payment methods
    PaymentMethod, "payment method" {
        /// Manual bank transfer
        BankTransfer => "bank_transfer",
        /// QRIS code payment
        Qris => "qris",
        /// E-wallet payment
        Ewallet => "ewallet",
    }
);

impl TransactionStatus {
    /// Whether this status still holds a reservation against the event
    #[must_use]
    pub const fn holds_inventory(&self) -> bool {
        matches!(self, Self::Pending | Self::WaitingVerification | Self::Success)
    }

    /// Terminal statuses accept no further transition
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Cancelled)
    }
}

impl PaymentMethod {
    /// Payment instructions shown to the buyer for this method
    #[must_use]
    pub const fn instructions(&self) -> &'static str {
        match self {
            Self::BankTransfer => "Transfer to Bank BCA 1234567890 a/n Ticket System",
            Self::Qris => "Scan the QRIS code provided",
            Self::Ewallet => "Pay through your registered e-wallet",
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// The slice of a user account the engine consumes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier
    pub id: UserId,
    /// Account role
    pub role: Role,
}

/// Event with a fixed ticket capacity, owned by an organizer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Organizer who owns the event
    pub owner_id: UserId,
    /// Display title
    pub title: String,
    /// When the event takes place
    pub event_date: DateTime<Utc>,
    /// Total tickets that may ever be reserved or sold
    pub max_capacity: u32,
    /// Tickets held by pending, waiting or successful transactions
    pub tickets_sold: u32,
    /// Price of one ticket
    pub price: Money,
    /// Lifecycle status
    pub status: EventStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Tickets still available (computed, not stored)
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.max_capacity.saturating_sub(self.tickets_sold)
    }

    /// Whether the event accepts new reservations
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == EventStatus::Active
    }
}

/// A purchase attempt by a buyer against one event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Surrogate identifier
    pub id: TransactionId,
    /// Buyer who owns the transaction
    pub user_id: UserId,
    /// Event the tickets are for
    pub event_id: EventId,
    /// Human-shareable unique code
    pub code: TransactionCode,
    /// Number of tickets (immutable)
    pub quantity: u32,
    /// `quantity × price` at creation (immutable)
    pub total_amount: Money,
    /// Lifecycle status
    pub status: TransactionStatus,
    /// Chosen payment method
    pub payment_method: PaymentMethod,
    /// Payment instructions captured at creation
    pub payment_detail: String,
    /// Opaque proof of payment (URL or reference)
    pub payment_proof: Option<String>,
    /// When the organizer verified the payment
    pub verified_at: Option<DateTime<Utc>>,
    /// Organizer who verified the payment; set iff status is success
    pub verified_by: Option<UserId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// Insert-side shape of a [`Transaction`], before the store assigns an id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTransaction {
    /// Buyer
    pub user_id: UserId,
    /// Event
    pub event_id: EventId,
    /// Generated code
    pub code: TransactionCode,
    /// Number of tickets
    pub quantity: u32,
    /// Frozen total
    pub total_amount: Money,
    /// Payment method
    pub payment_method: PaymentMethod,
    /// Payment instructions
    pub payment_detail: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    /// Materialize the stored row once the store has assigned an id
    #[must_use]
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            user_id: self.user_id,
            event_id: self.event_id,
            code: self.code,
            quantity: self.quantity,
            total_amount: self.total_amount,
            status: TransactionStatus::Pending,
            payment_method: self.payment_method,
            payment_detail: self.payment_detail,
            payment_proof: None,
            verified_at: None,
            verified_by: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

// ============================================================================
// Views and queries
// ============================================================================

/// Public view of a transaction returned to callers
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    /// Surrogate id
    pub id: TransactionId,
    /// Shareable code
    pub code: TransactionCode,
    /// Event id
    pub event_id: EventId,
    /// Event title (empty when the event no longer exists)
    pub event_title: String,
    /// Number of tickets
    pub quantity: u32,
    /// Frozen total
    pub total_amount: Money,
    /// Current status
    pub status: TransactionStatus,
    /// Payment method
    pub payment_method: PaymentMethod,
    /// Payment instructions keyed by method
    pub payment_instructions: String,
    /// Uploaded proof, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_proof: Option<String>,
    /// Verification time, if verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl TransactionView {
    /// Build the view from a transaction and the title of its event
    #[must_use]
    pub fn new(tx: Transaction, event_title: String) -> Self {
        Self {
            id: tx.id,
            code: tx.code,
            event_id: tx.event_id,
            event_title,
            quantity: tx.quantity,
            total_amount: tx.total_amount,
            status: tx.status,
            payment_method: tx.payment_method,
            payment_instructions: tx.payment_detail,
            payment_proof: tx.payment_proof,
            verified_at: tx.verified_at,
            created_at: tx.created_at,
        }
    }
}

/// Sales summary of one event for its organizer
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventSales {
    /// Event id
    pub event_id: EventId,
    /// Event title
    pub title: String,
    /// Capacity
    pub max_capacity: u32,
    /// Tickets held or sold
    pub tickets_sold: u32,
    /// Tickets still available
    pub available: u32,
    /// Price of one ticket
    pub price: Money,
    /// `tickets_sold × price`
    pub gross_sales: Money,
    /// Event status
    pub status: EventStatus,
}

/// One page of a listing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub page: u32,
    /// Rows per page
    pub page_size: u32,
}

impl Page {
    /// Validate a page request against the configured maximum page size.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when `page` is zero or
    /// `page_size` is outside `1..=max_page_size`.
    pub fn new(page: u32, page_size: u32, max_page_size: u32) -> Result<Self> {
        if page == 0 {
            return Err(EngineError::invalid_input("page must start at 1"));
        }
        if page_size == 0 || page_size > max_page_size {
            return Err(EngineError::invalid_input(format!(
                "page size must be between 1 and {max_page_size}"
            )));
        }
        Ok(Self { page, page_size })
    }

    /// Rows to skip
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }
}
