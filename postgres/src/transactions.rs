//! `PostgreSQL` transaction store.

use crate::{corrupt_column, from_db_count, storage_fault, to_db_count};
use boxoffice_core::error::{EngineError, LifecycleAction, Resource, Result};
use boxoffice_core::providers::TransactionStore;
use boxoffice_core::types::{
    EventId, Money, NewTransaction, Page, Transaction, TransactionCode, TransactionId,
    TransactionStatus, UserId,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

macro_rules! transaction_columns {
    () => {
        "id, user_id, event_id, transaction_code, quantity, total_amount_cents, status, \
         payment_method, payment_detail, payment_proof, verified_at, verified_by, \
         created_at, updated_at"
    };
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    user_id: i64,
    event_id: i64,
    transaction_code: String,
    quantity: i32,
    total_amount_cents: i64,
    status: String,
    payment_method: String,
    payment_detail: String,
    payment_proof: Option<String>,
    verified_at: Option<DateTime<Utc>>,
    verified_by: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = EngineError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Self {
            id: TransactionId(row.id),
            user_id: UserId(row.user_id),
            event_id: EventId(row.event_id),
            code: TransactionCode::new(row.transaction_code),
            quantity: from_db_count(row.quantity, "transactions.quantity")?,
            total_amount: Money::from_cents(
                u64::try_from(row.total_amount_cents)
                    .map_err(|_| corrupt_column("transactions.total_amount_cents"))?,
            ),
            status: row
                .status
                .parse()
                .map_err(|_| corrupt_column("transactions.status"))?,
            payment_method: row
                .payment_method
                .parse()
                .map_err(|_| corrupt_column("transactions.payment_method"))?,
            payment_detail: row.payment_detail,
            payment_proof: row.payment_proof,
            verified_at: row.verified_at,
            verified_by: row.verified_by.map(UserId),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Store over the `transactions` table.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    /// Create a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explain a compare-and-set that matched no row.
    async fn rejected_transition(
        &self,
        id: TransactionId,
        next: TransactionStatus,
    ) -> EngineError {
        match self.find_by_id(id).await {
            Ok(Some(current)) => {
                EngineError::transaction_transition(current.status, LifecycleAction::toward(next))
            }
            Ok(None) => EngineError::not_found(Resource::Transaction),
            Err(err) => err,
        }
    }
}

impl TransactionStore for PostgresTransactionStore {
    async fn create(&self, new: NewTransaction) -> Result<Transaction> {
        let total = i64::try_from(new.total_amount.cents())
            .map_err(|_| EngineError::invalid_input("total amount out of range"))?;

        let row = sqlx::query_as::<_, TransactionRow>(concat!(
            "INSERT INTO transactions \
                 (user_id, event_id, transaction_code, quantity, total_amount_cents, \
                  status, payment_method, payment_detail, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $8) \
             RETURNING ",
            transaction_columns!()
        ))
        .bind(new.user_id.value())
        .bind(new.event_id.value())
        .bind(new.code.as_str())
        .bind(to_db_count(new.quantity)?)
        .bind(total)
        .bind(new.payment_method.as_str())
        .bind(&new.payment_detail)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return EngineError::DuplicateCode;
                }
            }
            storage_fault("Failed to create transaction", &e)
        })?;

        Transaction::try_from(row)
    }

    async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM transactions WHERE id = $1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to load transaction", &e))?
        .map(Transaction::try_from)
        .transpose()
    }

    async fn find_by_code(&self, code: &TransactionCode) -> Result<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM transactions WHERE transaction_code = $1"
        ))
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to load transaction", &e))?
        .map(Transaction::try_from)
        .transpose()
    }

    async fn find_by_user(&self, user_id: UserId, page: Page) -> Result<(Vec<Transaction>, u64)> {
        let offset = i64::try_from(page.offset())
            .map_err(|_| EngineError::invalid_input("page out of range"))?;

        let rows = sqlx::query_as::<_, TransactionRow>(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM transactions WHERE user_id = $1 \
              ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id.value())
        .bind(i64::from(page.page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to list transactions", &e))?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE user_id = $1")
                .bind(user_id.value())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| storage_fault("Failed to count transactions", &e))?;

        let items = rows
            .into_iter()
            .map(Transaction::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, u64::try_from(total).unwrap_or_default()))
    }

    async fn update_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<Transaction> {
        let updated = sqlx::query_as::<_, TransactionRow>(concat!(
            "UPDATE transactions SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING ",
            transaction_columns!()
        ))
        .bind(id.value())
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to update transaction status", &e))?;

        match updated {
            Some(row) => Transaction::try_from(row),
            None => Err(self.rejected_transition(id, next).await),
        }
    }

    async fn attach_proof(
        &self,
        id: TransactionId,
        proof: &str,
        at: DateTime<Utc>,
    ) -> Result<Transaction> {
        let updated = sqlx::query_as::<_, TransactionRow>(concat!(
            "UPDATE transactions \
             SET status = 'waiting_verification', payment_proof = $2, updated_at = $3 \
             WHERE id = $1 AND status = 'pending' \
             RETURNING ",
            transaction_columns!()
        ))
        .bind(id.value())
        .bind(proof)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to attach payment proof", &e))?;

        match updated {
            Some(row) => Transaction::try_from(row),
            None => Err(self
                .rejected_transition(id, TransactionStatus::WaitingVerification)
                .await),
        }
    }

    async fn mark_verified(
        &self,
        id: TransactionId,
        verifier: UserId,
        at: DateTime<Utc>,
    ) -> Result<Transaction> {
        let updated = sqlx::query_as::<_, TransactionRow>(concat!(
            "UPDATE transactions \
             SET status = 'success', verified_by = $2, verified_at = $3, updated_at = $3 \
             WHERE id = $1 AND status = 'waiting_verification' \
             RETURNING ",
            transaction_columns!()
        ))
        .bind(id.value())
        .bind(verifier.value())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to verify transaction", &e))?;

        match updated {
            Some(row) => Transaction::try_from(row),
            None => Err(self.rejected_transition(id, TransactionStatus::Success).await),
        }
    }
}
