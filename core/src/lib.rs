//! # Boxoffice Core
//!
//! Capacity-safe ticket reservation coupled to a payment-verification
//! state machine.
//!
//! Organizers publish events with a fixed ticket capacity. Buyers reserve
//! tickets through a multi-step flow: create (reserve), upload proof of
//! payment, and organizer verification, or cancellation while pending.
//!
//! ## Components
//!
//! - **Inventory ledger** ([`providers::InventoryLedger`]): sole writer of an
//!   event's `tickets_sold`, with atomic check-and-update reserve/release
//! - **Transaction store** ([`providers::TransactionStore`]): durable purchase
//!   records with compare-and-set status changes
//! - **Lifecycle controller** ([`lifecycle::TransactionLifecycle`]): the
//!   state machine, pairing every inventory effect with its transaction write
//! - **Access policy** ([`policy`]): pure ownership and role predicates
//!
//! ## Invariants
//!
//! - `0 ≤ tickets_sold ≤ max_capacity` for every event, under any number of
//!   concurrent buyers
//! - At quiescence, `tickets_sold` equals the summed quantity of the event's
//!   pending, waiting and successful transactions
//! - Illegal transitions fail with [`EngineError::InvalidStateTransition`] and
//!   change nothing
//!
//! ## Example
//!
//! ```
//! use boxoffice_core::config::EngineConfig;
//! use boxoffice_core::lifecycle::TransactionLifecycle;
//! use boxoffice_core::mocks::{InMemoryLedger, InMemoryTransactionStore, InMemoryUserDirectory};
//! use boxoffice_core::types::{Event, EventId, EventStatus, Money, Role, TransactionStatus, UserId};
//! use chrono::Utc;
//!
//! # async fn example() -> boxoffice_core::Result<()> {
//! let ledger = InMemoryLedger::new();
//! let users = InMemoryUserDirectory::new();
//! users.insert(UserId(1), Role::User);
//!
//! let now = Utc::now();
//! ledger.insert_event(Event {
//!     id: EventId(10),
//!     owner_id: UserId(2),
//!     title: "Jazz Night".to_string(),
//!     event_date: now,
//!     max_capacity: 10,
//!     tickets_sold: 0,
//!     price: Money::from_cents(50_000),
//!     status: EventStatus::Active,
//!     created_at: now,
//!     updated_at: now,
//! });
//!
//! let engine = TransactionLifecycle::new(
//!     ledger,
//!     InMemoryTransactionStore::new(),
//!     users,
//!     EngineConfig::default(),
//! );
//!
//! let view = engine
//!     .create_transaction(UserId(1), EventId(10), 3, "bank_transfer")
//!     .await?;
//! assert_eq!(view.status, TransactionStatus::Pending);
//! assert_eq!(view.total_amount, Money::from_cents(150_000));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod code;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod policy;
pub mod providers;
pub mod retry;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use error::{EngineError, ErrorCategory, Result};
pub use lifecycle::TransactionLifecycle;
