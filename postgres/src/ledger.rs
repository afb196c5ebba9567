//! `PostgreSQL` inventory ledger.
//!
//! Each mutation is a single conditional `UPDATE ... RETURNING`. When the
//! condition rejects the write (zero rows), a follow-up read tells the
//! caller why: missing event, inactive event, or not enough room.

use crate::{corrupt_column, from_db_count, storage_fault, to_db_count};
use boxoffice_core::error::{EngineError, FromState, LifecycleAction, Resource, Result};
use boxoffice_core::providers::InventoryLedger;
use boxoffice_core::types::{Event, EventId, EventStatus, Money, UserId};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

macro_rules! event_columns {
    () => {
        "id, owner_id, title, event_date, max_capacity, tickets_sold, price_cents, status, \
         created_at, updated_at"
    };
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    owner_id: i64,
    title: String,
    event_date: DateTime<Utc>,
    max_capacity: i32,
    tickets_sold: i32,
    price_cents: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = EngineError;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(Self {
            id: EventId(row.id),
            owner_id: UserId(row.owner_id),
            title: row.title,
            event_date: row.event_date,
            max_capacity: from_db_count(row.max_capacity, "events.max_capacity")?,
            tickets_sold: from_db_count(row.tickets_sold, "events.tickets_sold")?,
            price: Money::from_cents(
                u64::try_from(row.price_cents).map_err(|_| corrupt_column("events.price_cents"))?,
            ),
            status: row
                .status
                .parse()
                .map_err(|_| corrupt_column("events.status"))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Ledger over the `events` table.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
}

impl PostgresInventoryLedger {
    /// Create a ledger over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn require_event(&self, id: EventId) -> Result<Event> {
        self.find_event(id)
            .await?
            .ok_or(EngineError::not_found(Resource::Event))
    }
}

impl InventoryLedger for PostgresInventoryLedger {
    async fn find_event(&self, id: EventId) -> Result<Option<Event>> {
        sqlx::query_as::<_, EventRow>(concat!(
            "SELECT ",
            event_columns!(),
            " FROM events WHERE id = $1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to load event", &e))?
        .map(Event::try_from)
        .transpose()
    }

    async fn reserve(&self, id: EventId, quantity: u32) -> Result<Event> {
        if quantity == 0 {
            return Err(EngineError::invalid_input("quantity must be positive"));
        }

        // Written as `$2 <= max_capacity - tickets_sold` so the comparison
        // cannot overflow INTEGER.
        let updated = sqlx::query_as::<_, EventRow>(concat!(
            "UPDATE events SET tickets_sold = tickets_sold + $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'active' AND $2 <= max_capacity - tickets_sold \
             RETURNING ",
            event_columns!()
        ))
        .bind(id.value())
        .bind(to_db_count(quantity)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to reserve tickets", &e))?;

        if let Some(row) = updated {
            return Event::try_from(row);
        }

        let event = self.require_event(id).await?;
        if !event.is_active() {
            return Err(EngineError::InvalidStateTransition {
                from: FromState::Event(event.status),
                action: LifecycleAction::Reserve,
            });
        }

        tracing::debug!(
            event_id = %id,
            quantity,
            available = event.available(),
            "Conditional reserve matched no row"
        );
        Err(EngineError::CapacityExceeded {
            requested: quantity,
            available: event.available(),
        })
    }

    async fn release(&self, id: EventId, quantity: u32) -> Result<Event> {
        let updated = sqlx::query_as::<_, EventRow>(concat!(
            "UPDATE events SET tickets_sold = tickets_sold - $2, updated_at = NOW() \
             WHERE id = $1 AND tickets_sold >= $2 \
             RETURNING ",
            event_columns!()
        ))
        .bind(id.value())
        .bind(to_db_count(quantity)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to release tickets", &e))?;

        if let Some(row) = updated {
            return Event::try_from(row);
        }

        let event = self.require_event(id).await?;
        tracing::error!(
            event_id = %id,
            quantity,
            tickets_sold = event.tickets_sold,
            "Release would underflow tickets_sold"
        );
        Err(EngineError::InventoryUnderflow {
            event_id: id,
            requested: quantity,
            sold: event.tickets_sold,
        })
    }

    async fn resize(&self, id: EventId, capacity: u32) -> Result<Event> {
        if capacity == 0 {
            return Err(EngineError::invalid_input("capacity must be positive"));
        }

        let updated = sqlx::query_as::<_, EventRow>(concat!(
            "UPDATE events SET max_capacity = $2, updated_at = NOW() \
             WHERE id = $1 AND tickets_sold <= $2 \
             RETURNING ",
            event_columns!()
        ))
        .bind(id.value())
        .bind(to_db_count(capacity)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to resize event", &e))?;

        if let Some(row) = updated {
            return Event::try_from(row);
        }

        let event = self.require_event(id).await?;
        Err(EngineError::invalid_input(format!(
            "capacity {capacity} is below the {} tickets already sold",
            event.tickets_sold
        )))
    }

    async fn set_status(&self, id: EventId, status: EventStatus) -> Result<Event> {
        sqlx::query_as::<_, EventRow>(concat!(
            "UPDATE events SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING ",
            event_columns!()
        ))
        .bind(id.value())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_fault("Failed to update event status", &e))?
        .ok_or(EngineError::not_found(Resource::Event))
        .and_then(Event::try_from)
    }
}
