//! Shared domain types for the parts marketplace
//!
//! Pure types used by the server and any future client crate:
//!
//! - **order**: order status graph, actor roles, transition authority
//! - **payment**: untrusted gateway notification payload
//! - **util**: time helpers

pub mod order;
pub mod payment;
pub mod util;

// Re-exports
pub use order::{Actor, AuthorityError, OrderStatus, OrderView, Role};
pub use payment::{ClaimedStatus, PaymentNotification};
