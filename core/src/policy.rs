//! Access policy predicates.
//!
//! Pure functions consulted by the lifecycle controller before every
//! mutating transition. No I/O, no side effects.

use crate::types::{Event, Role, Transaction, User, UserId};

/// Whether `user_id` is the buyer who owns `tx`.
#[must_use]
pub fn is_transaction_owner(tx: &Transaction, user_id: UserId) -> bool {
    tx.user_id == user_id
}

/// Whether `user_id` is the organizer who owns `event`.
#[must_use]
pub fn is_event_organizer(event: &Event, user_id: UserId) -> bool {
    event.owner_id == user_id
}

/// Whether `user` holds `role`.
#[must_use]
pub fn has_role(user: &User, role: Role) -> bool {
    user.role == role
}

/// Read visibility of a transaction: its buyer, or the organizer of its event.
///
/// `event` is `None` when the referenced event no longer exists, in which
/// case only the buyer can see the transaction.
#[must_use]
pub fn can_view_transaction(tx: &Transaction, event: Option<&Event>, user_id: UserId) -> bool {
    is_transaction_owner(tx, user_id) || event.is_some_and(|e| is_event_organizer(e, user_id))
}
