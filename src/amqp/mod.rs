//! Helpers for connecting to the broker.

pub mod configuration;
mod factory;
pub(crate) use factory::ConnectionFactory;

pub use lapin::message::Delivery;
pub use lapin::{options, types, BasicProperties};
