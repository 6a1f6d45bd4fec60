//! Order Lifecycle Module
//!
//! This module implements the order side of the engine:
//!
//! - **money**: precise decimal arithmetic for totals and tax
//! - **inventory**: per-listing atomic reserve/release ledger
//! - **service**: placement commit protocol and the status state machine
//! - **expiry**: background reaper for stale pending-payment orders
//!
//! # Placement Flow
//!
//! ```text
//! CreateOrderRequest
//!     ├─ 1. Validate buyer and every listing (active, exists)
//!     ├─ 2. Reserve inventory (atomic per listing, rollback on failure)
//!     ├─ 3. Snapshot prices, compute subtotal/tax/total
//!     ├─ 4. Persist order + items (single transaction)
//!     ├─ 5. Release reservations if persistence fails
//!     └─ 6. Notify buyer and sellers (fire-and-forget)
//! ```

pub mod expiry;
pub mod inventory;
pub mod money;
pub mod service;

// Re-exports
pub use expiry::ExpiryWorker;
pub use inventory::{InventoryLedger, LedgerError};
pub use service::{OrderError, OrderService, PaymentApplication};
