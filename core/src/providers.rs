//! Provider traits for the lifecycle controller's collaborators.
//!
//! The controller is generic over these seams so the same orchestration
//! runs against PostgreSQL in production and against the in-memory
//! implementations in [`crate::mocks`] in tests.
//!
//! Async methods return `impl Future + Send` so controller futures stay
//! spawnable on a multi-threaded runtime.

use crate::error::Result;
use crate::types::{
    Event, EventId, EventStatus, NewTransaction, Page, Transaction, TransactionCode,
    TransactionId, TransactionStatus, User, UserId,
};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Clock for timestamps.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of candidate transaction codes.
///
/// Candidates are not guaranteed unique; the store rejects collisions with
/// [`crate::EngineError::DuplicateCode`] and the controller asks again.
pub trait CodeGenerator: Send + Sync {
    /// Produce a candidate code for a transaction created at `now`
    fn generate(&self, now: DateTime<Utc>) -> TransactionCode;
}

/// Read access to user accounts (identity lives outside the engine).
pub trait UserDirectory: Send + Sync {
    /// Find a user by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageFault` if the lookup fails. An absent user is
    /// `Ok(None)`, never an error.
    fn find_user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;
}

/// Event inventory ledger.
///
/// Exclusive owner of `tickets_sold`. Every mutation is a single atomic
/// check-and-write with respect to concurrent callers on the same event.
pub trait InventoryLedger: Send + Sync {
    /// Find an event by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageFault` if the lookup fails. Absent is `Ok(None)`.
    fn find_event(&self, id: EventId) -> impl Future<Output = Result<Option<Event>>> + Send;

    /// Atomically add `quantity` to `tickets_sold` if it stays within capacity.
    ///
    /// Returns the event after the update.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `InvalidStateTransition` if the event is not active
    /// - `CapacityExceeded` if `tickets_sold + quantity > max_capacity`
    /// - `StorageFault` on I/O failure
    fn reserve(
        &self,
        id: EventId,
        quantity: u32,
    ) -> impl Future<Output = Result<Event>> + Send;

    /// Atomically subtract `quantity` from `tickets_sold`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `InventoryUnderflow` if `quantity > tickets_sold` (state unchanged)
    /// - `StorageFault` on I/O failure
    fn release(
        &self,
        id: EventId,
        quantity: u32,
    ) -> impl Future<Output = Result<Event>> + Send;

    /// Atomically change `max_capacity`, never below `tickets_sold`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `InvalidInput` if `capacity` is zero or below `tickets_sold`
    /// - `StorageFault` on I/O failure
    fn resize(
        &self,
        id: EventId,
        capacity: u32,
    ) -> impl Future<Output = Result<Event>> + Send;

    /// Set the event status.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `StorageFault` on I/O failure
    fn set_status(
        &self,
        id: EventId,
        status: EventStatus,
    ) -> impl Future<Output = Result<Event>> + Send;
}

/// Durable record of purchase transactions.
pub trait TransactionStore: Send + Sync {
    /// Insert a new transaction in `pending`.
    ///
    /// # Errors
    ///
    /// - `DuplicateCode` if the code is already taken
    /// - `StorageFault` on I/O failure
    fn create(&self, new: NewTransaction) -> impl Future<Output = Result<Transaction>> + Send;

    /// Find a transaction by surrogate id.
    ///
    /// # Errors
    ///
    /// Returns `StorageFault` on I/O failure. Absent is `Ok(None)`.
    fn find_by_id(
        &self,
        id: TransactionId,
    ) -> impl Future<Output = Result<Option<Transaction>>> + Send;

    /// Find a transaction by its code.
    ///
    /// # Errors
    ///
    /// Returns `StorageFault` on I/O failure. Absent is `Ok(None)`.
    fn find_by_code(
        &self,
        code: &TransactionCode,
    ) -> impl Future<Output = Result<Option<Transaction>>> + Send;

    /// One page of a user's transactions, newest first, plus the total count.
    ///
    /// # Errors
    ///
    /// Returns `StorageFault` on I/O failure.
    fn find_by_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> impl Future<Output = Result<(Vec<Transaction>, u64)>> + Send;

    /// Compare-and-set the status from `expected` to `next`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the transaction does not exist
    /// - `InvalidStateTransition` if the stored status is not `expected`
    ///   (state unchanged)
    /// - `StorageFault` on I/O failure
    fn update_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> impl Future<Output = Result<Transaction>> + Send;

    /// Store the payment proof and move `pending → waiting_verification`
    /// in one atomic write.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the transaction does not exist
    /// - `InvalidStateTransition` if it is not `pending`
    /// - `StorageFault` on I/O failure
    fn attach_proof(
        &self,
        id: TransactionId,
        proof: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Transaction>> + Send;

    /// Move `waiting_verification → success`, recording the verifier.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the transaction does not exist
    /// - `InvalidStateTransition` if it is not `waiting_verification`
    /// - `StorageFault` on I/O failure
    fn mark_verified(
        &self,
        id: TransactionId,
        verifier: UserId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Transaction>> + Send;
}
