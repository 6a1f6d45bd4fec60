//! Order domain: status graph, actor roles and transition authority
//!
//! The status graph is a static adjacency table so that the full set of
//! legal transitions can be enumerated in tests. Authority is a pure
//! data-driven check keyed by (actor kind, requested status, ownership
//! predicate) — transport concerns never reach this module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// Order Status
// =============================================================================

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    PaymentCompleted,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::PendingPayment,
        OrderStatus::PaymentCompleted,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// Static adjacency table: legal next statuses for each status
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::PendingPayment => {
                &[OrderStatus::PaymentCompleted, OrderStatus::Cancelled]
            }
            OrderStatus::PaymentCompleted => &[
                OrderStatus::Processing,
                OrderStatus::Cancelled,
                OrderStatus::Refunded,
            ],
            // Cancellation is only reachable before fulfilment starts
            OrderStatus::Processing => &[OrderStatus::Shipped, OrderStatus::Refunded],
            OrderStatus::Shipped => &[OrderStatus::Delivered, OrderStatus::Refunded],
            OrderStatus::Delivered => &[OrderStatus::Refunded],
            // No transition leaves a fully terminal status
            OrderStatus::Cancelled | OrderStatus::Refunded => &[],
        }
    }

    /// Whether `next` is a legal transition from this status
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Fully terminal: no transition may ever leave this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Payment has been applied (payment completed or any later
    /// fulfilment stage). Used by the webhook idempotency guard.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::PaymentCompleted
                | OrderStatus::Processing
                | OrderStatus::Shipped
                | OrderStatus::Delivered
        )
    }

    /// Wire representation (matches serde rename)
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::PaymentCompleted => "PAYMENT_COMPLETED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Roles and Actors
// =============================================================================

/// Authenticated user role (parsed from upstream identity)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Admin,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

/// The identity on whose behalf a transition is requested.
///
/// `PaymentSystem` is a crate-internal capability: it is deliberately not
/// serializable and is never derived from request data. Only the webhook
/// reconciler constructs it, after its full verification pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Buyer { user_id: String },
    Seller { user_id: String },
    Admin { user_id: String },
    PaymentSystem,
}

impl Actor {
    /// Map an authenticated role to an actor. Request identities can never
    /// become `PaymentSystem`.
    pub fn from_role(role: Role, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        match role {
            Role::Buyer => Actor::Buyer { user_id },
            Role::Seller => Actor::Seller { user_id },
            Role::Admin => Actor::Admin { user_id },
        }
    }

    /// Identifier for audit logs
    pub fn audit_id(&self) -> &str {
        match self {
            Actor::Buyer { user_id } | Actor::Seller { user_id } | Actor::Admin { user_id } => {
                user_id
            }
            Actor::PaymentSystem => "payment-system",
        }
    }
}

// =============================================================================
// Transition Authority Table
// =============================================================================

/// Ownership predicate evaluated against the order being mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Actor must be the buyer of the order
    OwnOrder,
    /// Actor must sell at least one item in the order
    SellsInOrder,
    /// No ownership requirement
    Any,
}

/// Minimal view of an order for authority checks
#[derive(Debug, Clone, Copy)]
pub struct OrderView<'a> {
    pub buyer_id: &'a str,
    pub seller_ids: &'a [String],
}

const BUYER_TARGETS: &[OrderStatus] = &[OrderStatus::Cancelled];
const SELLER_TARGETS: &[OrderStatus] = &[
    OrderStatus::Processing,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
];
const PAYMENT_SYSTEM_TARGETS: &[OrderStatus] = &[OrderStatus::PaymentCompleted];

/// Authority table row for one actor kind
fn authority_for(actor: &Actor) -> (&'static [OrderStatus], Ownership) {
    match actor {
        Actor::Buyer { .. } => (BUYER_TARGETS, Ownership::OwnOrder),
        Actor::Seller { .. } => (SELLER_TARGETS, Ownership::SellsInOrder),
        Actor::Admin { .. } => (&OrderStatus::ALL, Ownership::Any),
        Actor::PaymentSystem => (PAYMENT_SYSTEM_TARGETS, Ownership::Any),
    }
}

/// Authority check failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("role may not request status {requested}")]
    NotPermitted { requested: OrderStatus },

    #[error("only the buyer of the order may request this transition")]
    NotOrderOwner,

    #[error("only a seller with items in the order may request this transition")]
    NotSellerOfOrder,
}

/// Pure, data-driven authority check: may `actor` request `requested`
/// on the order described by `order`? The status graph itself is checked
/// separately by the state machine.
pub fn authorize(
    actor: &Actor,
    requested: OrderStatus,
    order: &OrderView<'_>,
) -> Result<(), AuthorityError> {
    let (allowed, ownership) = authority_for(actor);

    if !allowed.contains(&requested) {
        return Err(AuthorityError::NotPermitted { requested });
    }

    match ownership {
        Ownership::Any => Ok(()),
        Ownership::OwnOrder => {
            let user_id = actor.audit_id();
            if order.buyer_id == user_id {
                Ok(())
            } else {
                Err(AuthorityError::NotOrderOwner)
            }
        }
        Ownership::SellsInOrder => {
            let user_id = actor.audit_id();
            if order.seller_ids.iter().any(|s| s == user_id) {
                Ok(())
            } else {
                Err(AuthorityError::NotSellerOfOrder)
            }
        }
    }
}
