//! Shared fixtures for controller tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use boxoffice_core::config::EngineConfig;
use boxoffice_core::metrics::register_business_metrics;
use boxoffice_core::mocks::{
    FixedClock, InMemoryLedger, InMemoryTransactionStore, InMemoryUserDirectory,
    ScriptedCodeGenerator,
};
use boxoffice_core::retry::RetryPolicy;
use boxoffice_core::telemetry;
use boxoffice_core::types::{Event, EventId, EventStatus, Money, Role, UserId};
use boxoffice_core::TransactionLifecycle;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

pub const BUYER: UserId = UserId(1);
pub const OTHER_BUYER: UserId = UserId(2);
pub const ORGANIZER: UserId = UserId(100);
pub const OTHER_ORGANIZER: UserId = UserId(101);
pub const EVENT: EventId = EventId(10);
pub const TICKET_PRICE: Money = Money::from_cents(25_000);

pub type Engine =
    TransactionLifecycle<InMemoryLedger, InMemoryTransactionStore, InMemoryUserDirectory>;

pub struct Harness {
    pub engine: Arc<Engine>,
    pub ledger: InMemoryLedger,
    pub store: InMemoryTransactionStore,
    pub users: InMemoryUserDirectory,
    pub clock: FixedClock,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn event(id: EventId, owner: UserId, capacity: u32, price: Money) -> Event {
    let now = start_time();
    Event {
        id,
        owner_id: owner,
        title: format!("Concert #{id}"),
        event_date: now,
        max_capacity: capacity,
        tickets_sold: 0,
        price,
        status: EventStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

impl Harness {
    /// One active event of `capacity` seats owned by [`ORGANIZER`].
    pub fn new(capacity: u32) -> Self {
        Self::build(capacity, ScriptedCodeGenerator::default(), EngineConfig::default())
    }

    /// Like [`Harness::new`] with scripted transaction codes.
    pub fn with_codes(capacity: u32, codes: &[&str]) -> Self {
        Self::build(
            capacity,
            ScriptedCodeGenerator::new(codes.iter().copied()),
            EngineConfig::default(),
        )
    }

    pub fn build(capacity: u32, codes: ScriptedCodeGenerator, config: EngineConfig) -> Self {
        // Only the first harness in the process installs the subscriber.
        let _ = telemetry::init("boxoffice_core=debug");
        register_business_metrics();

        let ledger = InMemoryLedger::new();
        let store = InMemoryTransactionStore::new();
        let users = InMemoryUserDirectory::new();
        let clock = FixedClock::new(start_time());

        users.insert(BUYER, Role::User);
        users.insert(OTHER_BUYER, Role::User);
        users.insert(ORGANIZER, Role::Organizer);
        users.insert(OTHER_ORGANIZER, Role::Organizer);
        ledger.insert_event(event(EVENT, ORGANIZER, capacity, TICKET_PRICE));

        let engine = TransactionLifecycle::new(ledger.clone(), store.clone(), users.clone(), config)
            .with_clock(Arc::new(clock.clone()))
            .with_code_generator(Arc::new(codes))
            .with_compensation_policy(RetryPolicy::immediate(3));

        Self {
            engine: Arc::new(engine),
            ledger,
            store,
            users,
            clock,
        }
    }

    pub fn sold(&self, event_id: EventId) -> u32 {
        self.ledger
            .snapshot(event_id)
            .expect("event exists")
            .tickets_sold
    }

    /// Sold counter matches the tickets held by live transactions.
    pub fn assert_conserved(&self, event_id: EventId) {
        let event = self.ledger.snapshot(event_id).expect("event exists");
        assert!(
            event.tickets_sold <= event.max_capacity,
            "oversold: {} > {}",
            event.tickets_sold,
            event.max_capacity
        );
        assert_eq!(event.tickets_sold, self.store.held_quantity(event_id));
    }
}
