//! In-memory provider implementations for testing.
//!
//! Each type implements one provider trait from [`crate::providers`] on
//! `Arc`-shared state, so clones observe the same data. A test can keep a
//! clone of the ledger or store to inspect state after the controller has
//! taken ownership of the original.

pub mod clock;
pub mod codes;
pub mod ledger;
pub mod store;
pub mod users;

pub use clock::FixedClock;
pub use codes::ScriptedCodeGenerator;
pub use ledger::InMemoryLedger;
pub use store::InMemoryTransactionStore;
pub use users::InMemoryUserDirectory;

use std::sync::atomic::{AtomicU32, Ordering};

/// Consume one pending injected fault, if any.
fn take_fault(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
