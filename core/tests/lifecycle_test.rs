//! Lifecycle controller behaviour over the in-memory providers.
//!
//! Covers the purchase state machine, access checks, code collisions and
//! the compensating steps taken when a storage write fails mid-saga.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

mod common;

use boxoffice_core::config::EngineConfig;
use boxoffice_core::error::{FromState, LifecycleAction, Resource};
use boxoffice_core::mocks::ScriptedCodeGenerator;
use boxoffice_core::providers::TransactionStore;
use boxoffice_core::types::{
    EventId, EventStatus, Money, PaymentMethod, TransactionCode, TransactionId, TransactionRef,
    TransactionStatus, UserId,
};
use boxoffice_core::{EngineError, ErrorCategory};
use chrono::Duration;
use common::{
    BUYER, EVENT, Harness, ORGANIZER, OTHER_BUYER, OTHER_ORGANIZER, TICKET_PRICE, event,
};

fn transition(from: TransactionStatus, action: LifecycleAction) -> EngineError {
    EngineError::transaction_transition(from, action)
}

// ═══════════════════════════════════════════════════════════
// Happy paths
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn create_reserves_and_cancel_releases() {
    let h = Harness::new(10);

    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 3, "bank_transfer")
        .await
        .unwrap();

    assert_eq!(view.status, TransactionStatus::Pending);
    assert_eq!(view.quantity, 3);
    assert_eq!(view.total_amount, Money::from_cents(75_000));
    assert_eq!(view.payment_method, PaymentMethod::BankTransfer);
    assert_eq!(
        view.payment_instructions,
        PaymentMethod::BankTransfer.instructions()
    );
    assert_eq!(view.event_title, "Concert #10");
    assert!(view.code.as_str().starts_with("TRX-20250115-"));
    assert_eq!(h.sold(EVENT), 3);

    let cancelled = h.engine.cancel_transaction(BUYER, view.id).await.unwrap();

    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
    assert_eq!(h.sold(EVENT), 0);
    h.assert_conserved(EVENT);
}

#[tokio::test]
async fn verification_keeps_the_reservation() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 2, "qris")
        .await
        .unwrap();
    assert_eq!(h.sold(EVENT), 2);

    let waiting = h
        .engine
        .upload_proof(BUYER, view.id, "  https://cdn.example/proof.jpg  ")
        .await
        .unwrap();
    assert_eq!(waiting.status, TransactionStatus::WaitingVerification);
    assert_eq!(
        waiting.payment_proof.as_deref(),
        Some("https://cdn.example/proof.jpg")
    );

    h.clock.advance(Duration::hours(2));
    let verified = h.engine.verify_payment(ORGANIZER, view.id).await.unwrap();

    assert_eq!(verified.status, TransactionStatus::Success);
    assert_eq!(verified.verified_by, Some(ORGANIZER));
    assert_eq!(
        verified.verified_at,
        Some(common::start_time() + Duration::hours(2))
    );
    assert_eq!(h.sold(EVENT), 2);
    h.assert_conserved(EVENT);
}

// ═══════════════════════════════════════════════════════════
// State machine legality
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn verify_before_proof_is_rejected() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 2, "ewallet")
        .await
        .unwrap();

    let result = h.engine.verify_payment(ORGANIZER, view.id).await;

    assert_eq!(
        result,
        Err(transition(TransactionStatus::Pending, LifecycleAction::Verify))
    );
    let stored = h.store.find_by_id(view.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert_eq!(stored.verified_by, None);
    assert_eq!(h.sold(EVENT), 2);
}

#[tokio::test]
async fn repeated_cancel_does_not_release_twice() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 4, "qris")
        .await
        .unwrap();
    h.engine.cancel_transaction(BUYER, view.id).await.unwrap();

    let again = h.engine.cancel_transaction(BUYER, view.id).await;

    assert_eq!(
        again,
        Err(transition(TransactionStatus::Cancelled, LifecycleAction::Cancel))
    );
    assert_eq!(h.ledger.releases_attempted(), 1);
    assert_eq!(h.sold(EVENT), 0);
}

#[tokio::test]
async fn waiting_verification_cannot_be_cancelled_or_reuploaded() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 1, "qris")
        .await
        .unwrap();
    h.engine
        .upload_proof(BUYER, view.id, "ref-123")
        .await
        .unwrap();

    assert_eq!(
        h.engine.cancel_transaction(BUYER, view.id).await,
        Err(transition(
            TransactionStatus::WaitingVerification,
            LifecycleAction::Cancel
        ))
    );
    assert_eq!(
        h.engine.upload_proof(BUYER, view.id, "ref-456").await,
        Err(transition(
            TransactionStatus::WaitingVerification,
            LifecycleAction::UploadProof
        ))
    );

    let stored = h.store.find_by_id(view.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_proof.as_deref(), Some("ref-123"));
    assert_eq!(h.sold(EVENT), 1);
}

#[tokio::test]
async fn terminal_states_accept_nothing() {
    let h = Harness::new(10);
    let verified = h
        .engine
        .create_transaction(BUYER, EVENT, 1, "qris")
        .await
        .unwrap();
    h.engine.upload_proof(BUYER, verified.id, "p").await.unwrap();
    h.engine.verify_payment(ORGANIZER, verified.id).await.unwrap();

    let cancelled = h
        .engine
        .create_transaction(BUYER, EVENT, 1, "qris")
        .await
        .unwrap();
    h.engine.cancel_transaction(BUYER, cancelled.id).await.unwrap();

    for (id, status) in [
        (verified.id, TransactionStatus::Success),
        (cancelled.id, TransactionStatus::Cancelled),
    ] {
        assert_eq!(
            h.engine.upload_proof(BUYER, id, "p").await,
            Err(transition(status, LifecycleAction::UploadProof))
        );
        assert_eq!(
            h.engine.cancel_transaction(BUYER, id).await,
            Err(transition(status, LifecycleAction::Cancel))
        );
        assert_eq!(
            h.engine.verify_payment(ORGANIZER, id).await,
            Err(transition(status, LifecycleAction::Verify))
        );
    }
    assert_eq!(h.sold(EVENT), 1);
    h.assert_conserved(EVENT);
}

// ═══════════════════════════════════════════════════════════
// Input validation and capacity
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn invalid_create_requests_reserve_nothing() {
    let h = Harness::new(50);

    for (quantity, method) in [(0, "qris"), (11, "qris"), (2, "cash"), (2, "")] {
        let result = h
            .engine
            .create_transaction(BUYER, EVENT, quantity, method)
            .await;
        assert!(
            matches!(result, Err(EngineError::InvalidInput { .. })),
            "quantity {quantity} method {method:?}: {result:?}"
        );
    }
    assert_eq!(h.sold(EVENT), 0);
    assert!(h.store.for_event(EVENT).is_empty());
}

#[tokio::test]
async fn per_transaction_limit_is_configurable() {
    let config = EngineConfig {
        max_tickets_per_transaction: 2,
        ..EngineConfig::default()
    };
    let h = Harness::build(10, ScriptedCodeGenerator::default(), config);

    assert!(
        h.engine
            .create_transaction(BUYER, EVENT, 2, "qris")
            .await
            .is_ok()
    );
    assert!(matches!(
        h.engine.create_transaction(BUYER, EVENT, 3, "qris").await,
        Err(EngineError::InvalidInput { .. })
    ));
}

#[tokio::test]
async fn missing_buyer_or_event_is_not_found() {
    let h = Harness::new(10);

    assert_eq!(
        h.engine
            .create_transaction(UserId(999), EVENT, 1, "qris")
            .await,
        Err(EngineError::not_found(Resource::User))
    );
    assert_eq!(
        h.engine
            .create_transaction(BUYER, EventId(404), 1, "qris")
            .await,
        Err(EngineError::not_found(Resource::Event))
    );
}

#[tokio::test]
async fn capacity_is_never_exceeded() {
    let h = Harness::new(5);
    h.engine
        .create_transaction(BUYER, EVENT, 4, "qris")
        .await
        .unwrap();

    let result = h.engine.create_transaction(OTHER_BUYER, EVENT, 2, "qris").await;

    assert_eq!(
        result,
        Err(EngineError::CapacityExceeded {
            requested: 2,
            available: 1
        })
    );
    assert_eq!(result.unwrap_err().category(), ErrorCategory::Conflict);
    assert_eq!(h.sold(EVENT), 4);

    h.engine
        .create_transaction(OTHER_BUYER, EVENT, 1, "qris")
        .await
        .unwrap();
    assert_eq!(h.sold(EVENT), 5);
    h.assert_conserved(EVENT);
}

#[tokio::test]
async fn total_overflow_is_rejected_and_compensated() {
    let h = Harness::new(10);
    h.ledger.insert_event(event(
        EventId(11),
        ORGANIZER,
        10,
        Money::from_cents(u64::MAX / 2),
    ));

    let result = h
        .engine
        .create_transaction(BUYER, EventId(11), 3, "qris")
        .await;

    assert!(matches!(result, Err(EngineError::InvalidInput { .. })));
    assert_eq!(h.sold(EventId(11)), 0);
}

#[tokio::test]
async fn blank_proof_is_invalid() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 1, "qris")
        .await
        .unwrap();

    assert!(matches!(
        h.engine.upload_proof(BUYER, view.id, "   ").await,
        Err(EngineError::InvalidInput { .. })
    ));
    let stored = h.store.find_by_id(view.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
}

// ═══════════════════════════════════════════════════════════
// Access control
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn only_the_buyer_mutates_their_transaction() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 2, "qris")
        .await
        .unwrap();

    assert_eq!(
        h.engine.upload_proof(OTHER_BUYER, view.id, "p").await,
        Err(EngineError::Unauthorized)
    );
    assert_eq!(
        h.engine.cancel_transaction(OTHER_BUYER, view.id).await,
        Err(EngineError::Unauthorized)
    );
    assert_eq!(
        h.engine.cancel_transaction(ORGANIZER, view.id).await,
        Err(EngineError::Unauthorized)
    );
    assert_eq!(
        h.engine.cancel_transaction(BUYER, TransactionId(999)).await,
        Err(EngineError::not_found(Resource::Transaction))
    );
    assert_eq!(h.sold(EVENT), 2);
}

#[tokio::test]
async fn only_the_event_organizer_verifies() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 2, "qris")
        .await
        .unwrap();
    h.engine.upload_proof(BUYER, view.id, "p").await.unwrap();

    assert_eq!(
        h.engine.verify_payment(BUYER, view.id).await,
        Err(EngineError::Unauthorized)
    );
    assert_eq!(
        h.engine.verify_payment(OTHER_ORGANIZER, view.id).await,
        Err(EngineError::Unauthorized)
    );
    assert_eq!(
        h.engine.verify_payment(UserId(555), view.id).await,
        Err(EngineError::not_found(Resource::User))
    );

    let stored = h.store.find_by_id(view.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::WaitingVerification);
}

#[tokio::test]
async fn transactions_are_visible_to_buyer_and_organizer_only() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 2, "qris")
        .await
        .unwrap();

    let by_id = TransactionRef::parse(&view.id.to_string()).unwrap();
    let by_code = TransactionRef::parse(view.code.as_str()).unwrap();

    assert_eq!(h.engine.get_transaction(BUYER, &by_id).await, Ok(view.clone()));
    assert_eq!(h.engine.get_transaction(BUYER, &by_code).await, Ok(view.clone()));
    assert_eq!(h.engine.get_transaction(ORGANIZER, &by_code).await, Ok(view));
    assert_eq!(
        h.engine.get_transaction(OTHER_BUYER, &by_id).await,
        Err(EngineError::Unauthorized)
    );
    assert_eq!(
        h.engine.get_transaction(OTHER_ORGANIZER, &by_id).await,
        Err(EngineError::Unauthorized)
    );
    assert_eq!(
        h.engine
            .get_transaction(
                BUYER,
                &TransactionRef::Code(TransactionCode::new("TRX-19990101-000000".to_string()))
            )
            .await,
        Err(EngineError::not_found(Resource::Transaction))
    );
}

// ═══════════════════════════════════════════════════════════
// Listing
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn user_listing_is_paged_newest_first() {
    let h = Harness::new(20);
    let mut created = Vec::new();
    for quantity in 1..=3 {
        let view = h
            .engine
            .create_transaction(BUYER, EVENT, quantity, "qris")
            .await
            .unwrap();
        created.push(view.id);
        h.clock.advance(Duration::minutes(1));
    }
    h.engine
        .create_transaction(OTHER_BUYER, EVENT, 1, "qris")
        .await
        .unwrap();

    let (first, total) = h.engine.list_user_transactions(BUYER, 1, 2).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(
        first.iter().map(|v| v.id).collect::<Vec<_>>(),
        vec![created[2], created[1]]
    );
    assert!(first.iter().all(|v| v.event_title == "Concert #10"));

    let (second, _) = h.engine.list_user_transactions(BUYER, 2, 2).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, created[0]);

    let (beyond, total) = h.engine.list_user_transactions(BUYER, 9, 2).await.unwrap();
    assert!(beyond.is_empty());
    assert_eq!(total, 3);
}

#[tokio::test]
async fn listing_rejects_bad_paging() {
    let h = Harness::new(10);

    for (page, size) in [(0, 10), (1, 0), (1, 101)] {
        assert!(matches!(
            h.engine.list_user_transactions(BUYER, page, size).await,
            Err(EngineError::InvalidInput { .. })
        ));
    }
    assert_eq!(
        h.engine.list_user_transactions(BUYER, 1, 100).await,
        Ok((Vec::new(), 0))
    );
}

// ═══════════════════════════════════════════════════════════
// Code collisions
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn colliding_codes_are_regenerated() {
    let h = Harness::with_codes(10, &["TRX-A", "TRX-A", "TRX-A", "TRX-B"]);

    let first = h
        .engine
        .create_transaction(BUYER, EVENT, 1, "qris")
        .await
        .unwrap();
    let second = h
        .engine
        .create_transaction(BUYER, EVENT, 1, "qris")
        .await
        .unwrap();

    assert_eq!(first.code.as_str(), "TRX-A");
    assert_eq!(second.code.as_str(), "TRX-B");
    assert_eq!(h.sold(EVENT), 2);
}

#[tokio::test]
async fn exhausted_code_attempts_release_the_reservation() {
    let h = Harness::with_codes(10, &["TRX-A"; 6]);
    h.engine
        .create_transaction(BUYER, EVENT, 1, "qris")
        .await
        .unwrap();

    let result = h.engine.create_transaction(BUYER, EVENT, 3, "qris").await;

    assert_eq!(result, Err(EngineError::DuplicateCode));
    assert_eq!(h.sold(EVENT), 1);
    assert_eq!(h.store.for_event(EVENT).len(), 1);
    h.assert_conserved(EVENT);
}

// ═══════════════════════════════════════════════════════════
// Compensation
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn failed_create_releases_the_reservation() {
    let h = Harness::new(10);
    h.store.fail_next_creates(1);

    let result = h.engine.create_transaction(BUYER, EVENT, 4, "qris").await;

    assert!(matches!(result, Err(EngineError::StorageFault(_))));
    assert_eq!(
        result.unwrap_err().public_message(),
        "An internal error occurred"
    );
    assert_eq!(h.sold(EVENT), 0);
    assert!(h.store.for_event(EVENT).is_empty());
}

#[tokio::test]
async fn compensating_release_is_retried() {
    let h = Harness::new(10);
    h.store.fail_next_creates(1);
    h.ledger.fail_next_releases(2);

    let result = h.engine.create_transaction(BUYER, EVENT, 4, "qris").await;

    assert!(matches!(result, Err(EngineError::StorageFault(_))));
    assert_eq!(h.ledger.releases_attempted(), 3);
    assert_eq!(h.sold(EVENT), 0);
}

#[tokio::test]
async fn cancel_reopens_the_transaction_when_release_keeps_failing() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 3, "qris")
        .await
        .unwrap();
    h.ledger.fail_next_releases(10);

    let result = h.engine.cancel_transaction(BUYER, view.id).await;

    assert!(matches!(result, Err(EngineError::StorageFault(_))));
    assert_eq!(h.ledger.releases_attempted(), 4); // Initial + 3 retries
    let stored = h.store.find_by_id(view.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert_eq!(h.sold(EVENT), 3);
    h.assert_conserved(EVENT);

    h.ledger.fail_next_releases(0);
    let cancelled = h.engine.cancel_transaction(BUYER, view.id).await.unwrap();
    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
    assert_eq!(h.sold(EVENT), 0);
    h.assert_conserved(EVENT);
}

#[tokio::test]
async fn cancel_survives_transient_release_faults() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 3, "qris")
        .await
        .unwrap();
    h.ledger.fail_next_releases(2);

    let cancelled = h.engine.cancel_transaction(BUYER, view.id).await.unwrap();

    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
    assert_eq!(h.sold(EVENT), 0);
}

#[tokio::test]
async fn cancel_status_fault_changes_nothing() {
    let h = Harness::new(10);
    let view = h
        .engine
        .create_transaction(BUYER, EVENT, 3, "qris")
        .await
        .unwrap();
    h.store.fail_next_status_updates(1);

    let result = h.engine.cancel_transaction(BUYER, view.id).await;

    assert!(matches!(result, Err(EngineError::StorageFault(_))));
    assert_eq!(h.ledger.releases_attempted(), 0);
    assert_eq!(h.sold(EVENT), 3);
    h.assert_conserved(EVENT);
}

// ═══════════════════════════════════════════════════════════
// Event management
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn event_sales_report_gross_amount() {
    let h = Harness::new(10);
    h.engine
        .create_transaction(BUYER, EVENT, 3, "qris")
        .await
        .unwrap();
    h.engine
        .create_transaction(OTHER_BUYER, EVENT, 2, "ewallet")
        .await
        .unwrap();

    let sales = h.engine.get_event_sales(ORGANIZER, EVENT).await.unwrap();

    assert_eq!(sales.tickets_sold, 5);
    assert_eq!(sales.available, 5);
    assert_eq!(sales.max_capacity, 10);
    assert_eq!(sales.price, TICKET_PRICE);
    assert_eq!(sales.gross_sales, Money::from_cents(125_000));
    assert_eq!(sales.status, EventStatus::Active);

    assert_eq!(
        h.engine.get_event_sales(OTHER_ORGANIZER, EVENT).await,
        Err(EngineError::Unauthorized)
    );
    assert_eq!(
        h.engine.get_event_sales(ORGANIZER, EventId(404)).await,
        Err(EngineError::not_found(Resource::Event))
    );
}

#[tokio::test]
async fn capacity_cannot_shrink_below_sold() {
    let h = Harness::new(10);
    h.engine
        .create_transaction(BUYER, EVENT, 6, "qris")
        .await
        .unwrap();

    assert!(matches!(
        h.engine.resize_event_capacity(ORGANIZER, EVENT, 5).await,
        Err(EngineError::InvalidInput { .. })
    ));
    assert!(matches!(
        h.engine.resize_event_capacity(ORGANIZER, EVENT, 0).await,
        Err(EngineError::InvalidInput { .. })
    ));
    assert_eq!(
        h.engine.resize_event_capacity(OTHER_ORGANIZER, EVENT, 20).await,
        Err(EngineError::Unauthorized)
    );

    let resized = h
        .engine
        .resize_event_capacity(ORGANIZER, EVENT, 7)
        .await
        .unwrap();
    assert_eq!(resized.max_capacity, 7);
    assert!(matches!(
        h.engine.create_transaction(BUYER, EVENT, 2, "qris").await,
        Err(EngineError::CapacityExceeded { available: 1, .. })
    ));
}

#[tokio::test]
async fn cancelled_events_refuse_new_reservations() {
    let h = Harness::new(10);
    let existing = h
        .engine
        .create_transaction(BUYER, EVENT, 2, "qris")
        .await
        .unwrap();

    assert_eq!(
        h.engine.cancel_event(OTHER_ORGANIZER, EVENT).await,
        Err(EngineError::Unauthorized)
    );
    let cancelled = h.engine.cancel_event(ORGANIZER, EVENT).await.unwrap();
    assert_eq!(cancelled.status, EventStatus::Cancelled);

    assert_eq!(
        h.engine.create_transaction(BUYER, EVENT, 1, "qris").await,
        Err(EngineError::InvalidStateTransition {
            from: FromState::Event(EventStatus::Cancelled),
            action: LifecycleAction::Reserve,
        })
    );
    assert_eq!(
        h.engine.cancel_event(ORGANIZER, EVENT).await,
        Err(EngineError::InvalidStateTransition {
            from: FromState::Event(EventStatus::Cancelled),
            action: LifecycleAction::CancelEvent,
        })
    );

    let stored = h.store.find_by_id(existing.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert_eq!(h.sold(EVENT), 2);
}
