//! Mock inventory ledger.

use super::take_fault;
use crate::error::{EngineError, FromState, LifecycleAction, Resource, Result};
use crate::providers::InventoryLedger;
use crate::types::{Event, EventId, EventStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type EventSlot = Arc<Mutex<Event>>;

fn poisoned() -> EngineError {
    EngineError::StorageFault("ledger lock poisoned".to_string())
}

/// In-memory ledger.
///
/// Each event sits behind its own mutex, which is the serialization point
/// for check-and-update. Reservations on different events never contend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    events: Arc<RwLock<HashMap<EventId, EventSlot>>>,
    release_faults: Arc<AtomicU32>,
    releases_attempted: Arc<AtomicU32>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an event.
    pub fn insert_event(&self, event: Event) {
        self.events
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(event.id, Arc::new(Mutex::new(event)));
    }

    /// Current state of an event, outside any async context.
    #[must_use]
    pub fn snapshot(&self, id: EventId) -> Option<Event> {
        let slot = self
            .events
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .cloned()?;
        let event = slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        Some(event)
    }

    /// Make the next `n` releases fail with `StorageFault` without touching state.
    pub fn fail_next_releases(&self, n: u32) {
        self.release_faults.store(n, Ordering::SeqCst);
    }

    /// Release calls seen so far, including injected failures.
    #[must_use]
    pub fn releases_attempted(&self) -> u32 {
        self.releases_attempted.load(Ordering::SeqCst)
    }
}

fn slot_of(events: &RwLock<HashMap<EventId, EventSlot>>, id: EventId) -> Result<EventSlot> {
    events
        .read()
        .map_err(|_| poisoned())?
        .get(&id)
        .cloned()
        .ok_or(EngineError::not_found(Resource::Event))
}

impl InventoryLedger for InMemoryLedger {
    fn find_event(&self, id: EventId) -> impl Future<Output = Result<Option<Event>>> + Send {
        let events = Arc::clone(&self.events);

        async move {
            let slot = events.read().map_err(|_| poisoned())?.get(&id).cloned();
            match slot {
                Some(slot) => Ok(Some(slot.lock().map_err(|_| poisoned())?.clone())),
                None => Ok(None),
            }
        }
    }

    fn reserve(&self, id: EventId, quantity: u32) -> impl Future<Output = Result<Event>> + Send {
        let events = Arc::clone(&self.events);

        async move {
            if quantity == 0 {
                return Err(EngineError::invalid_input("quantity must be positive"));
            }

            let slot = slot_of(&events, id)?;
            let mut event = slot.lock().map_err(|_| poisoned())?;

            if !event.is_active() {
                return Err(EngineError::InvalidStateTransition {
                    from: FromState::Event(event.status),
                    action: LifecycleAction::Reserve,
                });
            }

            let available = event.available();
            if quantity > available {
                return Err(EngineError::CapacityExceeded {
                    requested: quantity,
                    available,
                });
            }

            event.tickets_sold += quantity;
            event.updated_at = Utc::now();
            Ok(event.clone())
        }
    }

    fn release(&self, id: EventId, quantity: u32) -> impl Future<Output = Result<Event>> + Send {
        let events = Arc::clone(&self.events);
        let faults = Arc::clone(&self.release_faults);
        let attempts = Arc::clone(&self.releases_attempted);

        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            if take_fault(&faults) {
                return Err(EngineError::StorageFault("injected release fault".to_string()));
            }

            let slot = slot_of(&events, id)?;
            let mut event = slot.lock().map_err(|_| poisoned())?;

            if quantity > event.tickets_sold {
                return Err(EngineError::InventoryUnderflow {
                    event_id: id,
                    requested: quantity,
                    sold: event.tickets_sold,
                });
            }

            event.tickets_sold -= quantity;
            event.updated_at = Utc::now();
            Ok(event.clone())
        }
    }

    fn resize(&self, id: EventId, capacity: u32) -> impl Future<Output = Result<Event>> + Send {
        let events = Arc::clone(&self.events);

        async move {
            if capacity == 0 {
                return Err(EngineError::invalid_input("capacity must be positive"));
            }

            let slot = slot_of(&events, id)?;
            let mut event = slot.lock().map_err(|_| poisoned())?;

            if capacity < event.tickets_sold {
                return Err(EngineError::invalid_input(format!(
                    "capacity {capacity} is below the {} tickets already sold",
                    event.tickets_sold
                )));
            }

            event.max_capacity = capacity;
            event.updated_at = Utc::now();
            Ok(event.clone())
        }
    }

    fn set_status(
        &self,
        id: EventId,
        status: EventStatus,
    ) -> impl Future<Output = Result<Event>> + Send {
        let events = Arc::clone(&self.events);

        async move {
            let slot = slot_of(&events, id)?;
            let mut event = slot.lock().map_err(|_| poisoned())?;
            event.status = status;
            event.updated_at = Utc::now();
            Ok(event.clone())
        }
    }
}
