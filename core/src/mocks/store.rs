//! Mock transaction store.

use super::take_fault;
use crate::error::{EngineError, LifecycleAction, Resource, Result};
use crate::providers::TransactionStore;
use crate::types::{
    EventId, NewTransaction, Page, Transaction, TransactionCode, TransactionId, TransactionStatus,
    UserId,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Rows {
    by_id: HashMap<TransactionId, Transaction>,
    by_code: HashMap<TransactionCode, TransactionId>,
    last_id: i64,
}

#[derive(Debug, Default)]
struct Faults {
    creates: AtomicU32,
    status_updates: AtomicU32,
}

fn poisoned() -> EngineError {
    EngineError::StorageFault("transaction store lock poisoned".to_string())
}

/// Apply a compare-and-set status change to a locked row.
fn transition(
    rows: &mut Rows,
    id: TransactionId,
    expected: TransactionStatus,
    next: TransactionStatus,
    at: DateTime<Utc>,
) -> Result<&mut Transaction> {
    let tx = rows
        .by_id
        .get_mut(&id)
        .ok_or(EngineError::not_found(Resource::Transaction))?;

    if tx.status != expected {
        return Err(EngineError::transaction_transition(
            tx.status,
            LifecycleAction::toward(next),
        ));
    }

    tx.status = next;
    tx.updated_at = at;
    Ok(tx)
}

/// In-memory transaction store.
///
/// One mutex guards all rows, so every write is atomic with respect to
/// every other. Codes are unique; ids are assigned sequentially from 1.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionStore {
    rows: Arc<Mutex<Rows>>,
    faults: Arc<Faults>,
}

impl InMemoryTransactionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` creates fail with `StorageFault`.
    pub fn fail_next_creates(&self, n: u32) {
        self.faults.creates.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `update_status` calls fail with `StorageFault`.
    pub fn fail_next_status_updates(&self, n: u32) {
        self.faults.status_updates.store(n, Ordering::SeqCst);
    }

    /// Every stored transaction for `event_id`, in id order.
    #[must_use]
    pub fn for_event(&self, event_id: EventId) -> Vec<Transaction> {
        let rows = self
            .rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut found: Vec<Transaction> = rows
            .by_id
            .values()
            .filter(|tx| tx.event_id == event_id)
            .cloned()
            .collect();
        found.sort_by_key(|tx| tx.id);
        found
    }

    /// Tickets held by non-cancelled transactions of `event_id`.
    #[must_use]
    pub fn held_quantity(&self, event_id: EventId) -> u32 {
        self.for_event(event_id)
            .iter()
            .filter(|tx| tx.status.holds_inventory())
            .map(|tx| tx.quantity)
            .sum()
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn create(&self, new: NewTransaction) -> impl Future<Output = Result<Transaction>> + Send {
        let rows = Arc::clone(&self.rows);
        let faults = Arc::clone(&self.faults);

        async move {
            if take_fault(&faults.creates) {
                return Err(EngineError::StorageFault("injected create fault".to_string()));
            }

            let mut rows = rows.lock().map_err(|_| poisoned())?;
            if rows.by_code.contains_key(&new.code) {
                return Err(EngineError::DuplicateCode);
            }

            rows.last_id += 1;
            let id = TransactionId(rows.last_id);
            let tx = new.into_transaction(id);
            rows.by_code.insert(tx.code.clone(), id);
            rows.by_id.insert(id, tx.clone());
            Ok(tx)
        }
    }

    fn find_by_id(
        &self,
        id: TransactionId,
    ) -> impl Future<Output = Result<Option<Transaction>>> + Send {
        let rows = Arc::clone(&self.rows);

        async move { Ok(rows.lock().map_err(|_| poisoned())?.by_id.get(&id).cloned()) }
    }

    fn find_by_code(
        &self,
        code: &TransactionCode,
    ) -> impl Future<Output = Result<Option<Transaction>>> + Send {
        let rows = Arc::clone(&self.rows);
        let code = code.clone();

        async move {
            let rows = rows.lock().map_err(|_| poisoned())?;
            Ok(rows
                .by_code
                .get(&code)
                .and_then(|id| rows.by_id.get(id))
                .cloned())
        }
    }

    fn find_by_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> impl Future<Output = Result<(Vec<Transaction>, u64)>> + Send {
        let rows = Arc::clone(&self.rows);

        async move {
            let rows = rows.lock().map_err(|_| poisoned())?;
            let mut owned: Vec<&Transaction> = rows
                .by_id
                .values()
                .filter(|tx| tx.user_id == user_id)
                .collect();
            owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

            let total = owned.len() as u64;
            let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            let items = owned
                .into_iter()
                .skip(skip)
                .take(page.page_size as usize)
                .cloned()
                .collect();
            Ok((items, total))
        }
    }

    fn update_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> impl Future<Output = Result<Transaction>> + Send {
        let rows = Arc::clone(&self.rows);
        let faults = Arc::clone(&self.faults);

        async move {
            if take_fault(&faults.status_updates) {
                return Err(EngineError::StorageFault(
                    "injected status update fault".to_string(),
                ));
            }

            let mut rows = rows.lock().map_err(|_| poisoned())?;
            transition(&mut rows, id, expected, next, Utc::now()).cloned()
        }
    }

    fn attach_proof(
        &self,
        id: TransactionId,
        proof: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Transaction>> + Send {
        let rows = Arc::clone(&self.rows);
        let proof = proof.to_string();

        async move {
            let mut rows = rows.lock().map_err(|_| poisoned())?;
            let tx = transition(
                &mut rows,
                id,
                TransactionStatus::Pending,
                TransactionStatus::WaitingVerification,
                at,
            )?;
            tx.payment_proof = Some(proof);
            Ok(tx.clone())
        }
    }

    fn mark_verified(
        &self,
        id: TransactionId,
        verifier: UserId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Transaction>> + Send {
        let rows = Arc::clone(&self.rows);

        async move {
            let mut rows = rows.lock().map_err(|_| poisoned())?;
            let tx = transition(
                &mut rows,
                id,
                TransactionStatus::WaitingVerification,
                TransactionStatus::Success,
                at,
            )?;
            tx.verified_at = Some(at);
            tx.verified_by = Some(verifier);
            Ok(tx.clone())
        }
    }
}
