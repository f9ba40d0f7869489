//! # Order Models
//!
//! The order aggregate as it travels on the queue, sits in the cache and is
//! stored across the `orders`, `deliveries`, `payments` and `items` tables.

pub mod order;

#[cfg(test)]
pub(crate) mod factories;

pub use order::{Delivery, Item, Order, Payment};
