//! Database models and API payload types

pub mod listing;
pub mod notification;
pub mod order;
pub mod payment;
pub mod serde_helpers;
pub mod user;

pub use listing::{Listing, ListingCreate};
pub use notification::{Notification, NotificationKind};
pub use order::{
    CreateOrderItemRequest, CreateOrderRequest, Order, OrderDto, OrderItem, OrderItemDto,
    UpdateOrderStatusRequest,
};
pub use payment::{PaymentRequest, PaymentResponse};
pub use user::{User, UserCreate};
