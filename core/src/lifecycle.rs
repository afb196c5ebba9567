//! Transaction lifecycle controller.
//!
//! Orchestrates the purchase state machine over the ledger, the store and
//! the user directory:
//!
//! ```text
//! (start) --create--> pending
//! pending --upload proof--> waiting_verification
//! pending --cancel--> cancelled                  [release(quantity)]
//! waiting_verification --verify--> success       [reservation kept]
//! ```
//!
//! Every transition that moves inventory is paired with its transaction
//! write as a two-step saga. When the second step fails, a compensating
//! step undoes the first, retried with backoff on transient faults.
//! Concurrent transitions on one transaction are arbitrated by the store's
//! compare-and-set: the loser sees the new status and fails with
//! [`EngineError::InvalidStateTransition`].

use crate::code::RandomCodeGenerator;
use crate::config::EngineConfig;
use crate::error::{EngineError, FromState, LifecycleAction, Resource, Result};
use crate::metrics;
use crate::policy;
use crate::providers::{
    Clock, CodeGenerator, InventoryLedger, SystemClock, TransactionStore, UserDirectory,
};
use crate::retry::{RetryPolicy, retry_with_predicate};
use crate::types::{
    Event, EventId, EventSales, EventStatus, NewTransaction, Page, PaymentMethod, Role,
    Transaction, TransactionId, TransactionRef, TransactionStatus, TransactionView, User, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;

/// The lifecycle controller.
///
/// Generic over its collaborators so the same orchestration runs against
/// `PostgreSQL` and against [`crate::mocks`].
pub struct TransactionLifecycle<L, S, U> {
    ledger: L,
    store: S,
    users: U,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    config: EngineConfig,
    compensation: RetryPolicy,
}

impl<L, S, U> TransactionLifecycle<L, S, U>
where
    L: InventoryLedger,
    S: TransactionStore,
    U: UserDirectory,
{
    /// Create a controller with the system clock and random codes.
    #[must_use]
    pub fn new(ledger: L, store: S, users: U, config: EngineConfig) -> Self {
        let compensation = config.compensation_policy();
        Self {
            ledger,
            store,
            users,
            clock: Arc::new(SystemClock),
            codes: Arc::new(RandomCodeGenerator),
            config,
            compensation,
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the code generator.
    #[must_use]
    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    /// Replace the backoff used for compensating steps.
    #[must_use]
    pub fn with_compensation_policy(mut self, policy: RetryPolicy) -> Self {
        self.compensation = policy;
        self
    }

    /// The inventory ledger.
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The transaction store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Engine configuration in effect.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════
    // Buyer operations
    // ═══════════════════════════════════════════════════════════

    /// Reserve `quantity` tickets and record a `pending` transaction.
    ///
    /// The reservation is taken first. If the transaction cannot be
    /// recorded afterwards the reservation is released before the error
    /// is returned.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a quantity outside `1..=max_tickets_per_transaction`,
    ///   an unknown payment method, or a total that overflows
    /// - `NotFound` if the buyer or event does not exist
    /// - `InvalidStateTransition` if the event is not active
    /// - `CapacityExceeded` if the event cannot hold `quantity` more tickets
    /// - `DuplicateCode` if every generated code collided
    /// - `StorageFault` on I/O failure
    #[tracing::instrument(skip_all, fields(buyer = %buyer, event_id = %event_id, quantity = quantity))]
    pub async fn create_transaction(
        &self,
        buyer: UserId,
        event_id: EventId,
        quantity: u32,
        payment_method: &str,
    ) -> Result<TransactionView> {
        if quantity == 0 {
            return Err(EngineError::invalid_input("quantity must be positive"));
        }
        let limit = self.config.max_tickets_per_transaction;
        if quantity > limit {
            return Err(EngineError::invalid_input(format!(
                "at most {limit} tickets per transaction"
            )));
        }
        let method: PaymentMethod = payment_method.parse()?;

        self.require_user(buyer).await?;

        let event = match self.ledger.reserve(event_id, quantity).await {
            Ok(event) => event,
            Err(err) => {
                if let EngineError::CapacityExceeded { available, .. } = err {
                    metrics::record_capacity_rejection();
                    tracing::info!(quantity, available, "Reservation refused, capacity exceeded");
                }
                return Err(err);
            }
        };
        metrics::record_reserved(quantity);

        match self.record_transaction(buyer, &event, quantity, method).await {
            Ok(tx) => {
                metrics::record_transition(TransactionStatus::Pending);
                tracing::info!(
                    transaction_id = %tx.id,
                    code = %tx.code,
                    quantity,
                    tickets_sold = event.tickets_sold,
                    "Transaction created"
                );
                Ok(TransactionView::new(tx, event.title))
            }
            Err(err) => {
                self.compensate_reservation(event_id, quantity, &err).await;
                Err(err)
            }
        }
    }

    /// Attach payment proof and move `pending → waiting_verification`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the proof is blank
    /// - `NotFound` if the transaction does not exist
    /// - `Unauthorized` if `buyer` does not own it
    /// - `InvalidStateTransition` if it is not `pending`
    /// - `StorageFault` on I/O failure
    pub async fn upload_proof(
        &self,
        buyer: UserId,
        id: TransactionId,
        proof: &str,
    ) -> Result<Transaction> {
        let proof = proof.trim();
        if proof.is_empty() {
            return Err(EngineError::invalid_input("payment proof is empty"));
        }

        let tx = self.load_transaction(id).await?;
        if !policy::is_transaction_owner(&tx, buyer) {
            return Err(EngineError::Unauthorized);
        }
        if tx.status != TransactionStatus::Pending {
            return Err(EngineError::transaction_transition(
                tx.status,
                LifecycleAction::UploadProof,
            ));
        }

        let updated = self.store.attach_proof(id, proof, self.clock.now()).await?;

        metrics::record_transition(TransactionStatus::WaitingVerification);
        tracing::info!(transaction_id = %id, buyer = %buyer, "Payment proof uploaded");
        Ok(updated)
    }

    /// Cancel a `pending` transaction and release its reservation.
    ///
    /// The status flips first, then the tickets are released with retries.
    /// If the release still fails the transaction is put back to `pending`
    /// so it stays cancellable, and the release error is returned.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the transaction does not exist
    /// - `Unauthorized` if `buyer` does not own it
    /// - `InvalidStateTransition` if it is not `pending`
    /// - `StorageFault` or `InventoryUnderflow` if the release failed
    #[tracing::instrument(skip_all, fields(buyer = %buyer, transaction_id = %id))]
    pub async fn cancel_transaction(&self, buyer: UserId, id: TransactionId) -> Result<Transaction> {
        let tx = self.load_transaction(id).await?;
        if !policy::is_transaction_owner(&tx, buyer) {
            return Err(EngineError::Unauthorized);
        }
        if tx.status != TransactionStatus::Pending {
            return Err(EngineError::transaction_transition(
                tx.status,
                LifecycleAction::Cancel,
            ));
        }

        let cancelled = self
            .store
            .update_status(id, TransactionStatus::Pending, TransactionStatus::Cancelled)
            .await?;

        match self.release_with_retry(tx.event_id, tx.quantity).await {
            Ok(event) => {
                metrics::record_released(tx.quantity);
                metrics::record_transition(TransactionStatus::Cancelled);
                tracing::info!(
                    event_id = %tx.event_id,
                    quantity = tx.quantity,
                    tickets_sold = event.tickets_sold,
                    "Transaction cancelled, reservation released"
                );
                Ok(cancelled)
            }
            Err(err) => {
                self.reopen_after_failed_release(id, &err).await;
                Err(err)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Organizer operations
    // ═══════════════════════════════════════════════════════════

    /// Verify the payment of a `waiting_verification` transaction.
    ///
    /// The reservation taken at creation becomes permanent; inventory is
    /// not touched.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the organizer, transaction or event does not exist
    /// - `Unauthorized` if the caller is not an organizer or does not own
    ///   the transaction's event
    /// - `InvalidStateTransition` if it is not `waiting_verification`
    /// - `StorageFault` on I/O failure
    pub async fn verify_payment(
        &self,
        organizer: UserId,
        id: TransactionId,
    ) -> Result<Transaction> {
        let user = self.require_user(organizer).await?;
        if !policy::has_role(&user, Role::Organizer) {
            return Err(EngineError::Unauthorized);
        }

        let tx = self.load_transaction(id).await?;
        self.owned_event(organizer, tx.event_id).await?;

        if tx.status != TransactionStatus::WaitingVerification {
            return Err(EngineError::transaction_transition(
                tx.status,
                LifecycleAction::Verify,
            ));
        }

        let verified = self
            .store
            .mark_verified(id, organizer, self.clock.now())
            .await?;

        metrics::record_transition(TransactionStatus::Success);
        tracing::info!(
            transaction_id = %id,
            organizer = %organizer,
            event_id = %tx.event_id,
            "Payment verified"
        );
        Ok(verified)
    }

    /// Sales summary of an event, for its organizer.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `Unauthorized` if `organizer` does not own it
    /// - `InvalidInput` if the gross amount overflows
    /// - `StorageFault` on I/O failure
    pub async fn get_event_sales(&self, organizer: UserId, event_id: EventId) -> Result<EventSales> {
        let event = self.owned_event(organizer, event_id).await?;
        let gross_sales = event
            .price
            .checked_multiply(event.tickets_sold)
            .ok_or_else(|| EngineError::invalid_input("gross sales overflow"))?;

        Ok(EventSales {
            event_id: event.id,
            available: event.available(),
            title: event.title,
            max_capacity: event.max_capacity,
            tickets_sold: event.tickets_sold,
            price: event.price,
            gross_sales,
            status: event.status,
        })
    }

    /// Change an event's capacity; never below the tickets already held.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `Unauthorized` if `organizer` does not own it
    /// - `InvalidInput` if `capacity` is zero or below `tickets_sold`
    /// - `StorageFault` on I/O failure
    pub async fn resize_event_capacity(
        &self,
        organizer: UserId,
        event_id: EventId,
        capacity: u32,
    ) -> Result<Event> {
        let event = self.owned_event(organizer, event_id).await?;
        let resized = self.ledger.resize(event_id, capacity).await?;

        tracing::info!(
            event_id = %event_id,
            from = event.max_capacity,
            to = resized.max_capacity,
            tickets_sold = resized.tickets_sold,
            "Event capacity changed"
        );
        Ok(resized)
    }

    /// Cancel an active event. Later reservations on it are refused;
    /// existing transactions are left as they are.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `Unauthorized` if `organizer` does not own it
    /// - `InvalidStateTransition` if the event is not active
    /// - `StorageFault` on I/O failure
    pub async fn cancel_event(&self, organizer: UserId, event_id: EventId) -> Result<Event> {
        let event = self.owned_event(organizer, event_id).await?;
        if event.status != EventStatus::Active {
            return Err(EngineError::InvalidStateTransition {
                from: FromState::Event(event.status),
                action: LifecycleAction::CancelEvent,
            });
        }

        let cancelled = self
            .ledger
            .set_status(event_id, EventStatus::Cancelled)
            .await?;

        tracing::info!(
            event_id = %event_id,
            tickets_sold = cancelled.tickets_sold,
            "Event cancelled"
        );
        Ok(cancelled)
    }

    // ═══════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════

    /// Look up a transaction by id or code.
    ///
    /// Visible to its buyer and to the organizer of its event.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the transaction does not exist
    /// - `Unauthorized` if `caller` may not see it
    /// - `StorageFault` on I/O failure
    pub async fn get_transaction(
        &self,
        caller: UserId,
        reference: &TransactionRef,
    ) -> Result<TransactionView> {
        let found = match reference {
            TransactionRef::Id(id) => self.store.find_by_id(*id).await?,
            TransactionRef::Code(code) => self.store.find_by_code(code).await?,
        };
        let tx = found.ok_or(EngineError::not_found(Resource::Transaction))?;

        let event = self.ledger.find_event(tx.event_id).await?;
        if !policy::can_view_transaction(&tx, event.as_ref(), caller) {
            return Err(EngineError::Unauthorized);
        }

        let title = event.map(|e| e.title).unwrap_or_default();
        Ok(TransactionView::new(tx, title))
    }

    /// One page of a user's transactions, newest first, with the total count.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a page below 1 or a page size outside
    ///   `1..=max_page_size`
    /// - `StorageFault` on I/O failure
    pub async fn list_user_transactions(
        &self,
        user: UserId,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<TransactionView>, u64)> {
        let page = Page::new(page, page_size, self.config.max_page_size)?;
        let (rows, total) = self.store.find_by_user(user, page).await?;

        let mut titles: HashMap<EventId, String> = HashMap::new();
        let mut views = Vec::with_capacity(rows.len());
        for tx in rows {
            let title = if let Some(title) = titles.get(&tx.event_id) {
                title.clone()
            } else {
                let title = self
                    .ledger
                    .find_event(tx.event_id)
                    .await?
                    .map(|e| e.title)
                    .unwrap_or_default();
                titles.insert(tx.event_id, title.clone());
                title
            };
            views.push(TransactionView::new(tx, title));
        }

        Ok((views, total))
    }

    // ═══════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════

    async fn require_user(&self, id: UserId) -> Result<User> {
        self.users
            .find_user(id)
            .await?
            .ok_or(EngineError::not_found(Resource::User))
    }

    async fn load_transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(EngineError::not_found(Resource::Transaction))
    }

    async fn owned_event(&self, organizer: UserId, event_id: EventId) -> Result<Event> {
        let event = self
            .ledger
            .find_event(event_id)
            .await?
            .ok_or(EngineError::not_found(Resource::Event))?;

        if !policy::is_event_organizer(&event, organizer) {
            return Err(EngineError::Unauthorized);
        }
        Ok(event)
    }

    /// Insert the transaction, regenerating the code on collisions.
    async fn record_transaction(
        &self,
        buyer: UserId,
        event: &Event,
        quantity: u32,
        method: PaymentMethod,
    ) -> Result<Transaction> {
        let total_amount = event
            .price
            .checked_multiply(quantity)
            .ok_or_else(|| EngineError::invalid_input("total amount overflows"))?;
        let now = self.clock.now();

        for attempt in 1..=self.config.code_attempts {
            let new = NewTransaction {
                user_id: buyer,
                event_id: event.id,
                code: self.codes.generate(now),
                quantity,
                total_amount,
                payment_method: method,
                payment_detail: method.instructions().to_string(),
                created_at: now,
            };

            match self.store.create(new).await {
                Err(EngineError::DuplicateCode) => {
                    metrics::record_code_collision();
                    tracing::debug!(attempt, "Transaction code collided, regenerating");
                }
                other => return other,
            }
        }

        tracing::warn!(
            attempts = self.config.code_attempts,
            "Could not generate a unique transaction code"
        );
        Err(EngineError::DuplicateCode)
    }

    async fn release_with_retry(&self, event_id: EventId, quantity: u32) -> Result<Event> {
        retry_with_predicate(
            &self.compensation,
            || self.ledger.release(event_id, quantity),
            EngineError::is_transient,
        )
        .await
    }

    /// Undo a reservation whose transaction was never recorded.
    async fn compensate_reservation(&self, event_id: EventId, quantity: u32, cause: &EngineError) {
        match self.release_with_retry(event_id, quantity).await {
            Ok(_) => {
                metrics::record_released(quantity);
                metrics::record_compensation(true);
                tracing::warn!(
                    event_id = %event_id,
                    quantity,
                    error = %cause,
                    "Transaction not recorded, reservation released"
                );
            }
            Err(err) => {
                metrics::record_compensation(false);
                tracing::error!(
                    event_id = %event_id,
                    quantity,
                    error = %cause,
                    release_error = %err,
                    "Transaction not recorded and reservation could not be released"
                );
            }
        }
    }

    /// Put a cancelled transaction back to `pending` after its release failed.
    async fn reopen_after_failed_release(&self, id: TransactionId, cause: &EngineError) {
        let reopened = retry_with_predicate(
            &self.compensation,
            || {
                self.store
                    .update_status(id, TransactionStatus::Cancelled, TransactionStatus::Pending)
            },
            EngineError::is_transient,
        )
        .await;

        match reopened {
            Ok(_) => {
                metrics::record_compensation(true);
                tracing::warn!(
                    transaction_id = %id,
                    error = %cause,
                    "Release failed, transaction returned to pending"
                );
            }
            Err(err) => {
                metrics::record_compensation(false);
                tracing::error!(
                    transaction_id = %id,
                    error = %cause,
                    reopen_error = %err,
                    "Release failed and transaction could not be reopened"
                );
            }
        }
    }
}
