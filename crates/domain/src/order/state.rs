//! Order status.

use serde::{Deserialize, Serialize};

/// The fulfilment status of an order.
///
/// Checkout creates every order as `Pending`. Payment and shipping live
/// outside this system and are not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
}
