//! SQL access layer. Free functions over `&PgPool` or an open transaction;
//! the row-locking primitives the allocation coordinator relies on live in
//! [`conversations`].

pub mod conversations;
pub mod grace_tickets;
pub mod idempotency;
pub mod inboxes;
pub mod labels;
pub mod operators;
pub mod tenants;
