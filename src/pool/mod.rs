//! Connection and channel management.
//!
//! This module provides two key guarantees:
//! - A single broker session is kept alive, redialing with bounded exponential backoff
//!   when it drops, and giving up for good once the budget is exhausted.
//! - Channels are pooled and reused across operations; broken ones are disposed of and
//!   recreated on demand. Checking a channel out never waits for another one to be
//!   released: when the pool is exhausted an extra, short-lived channel is opened.

mod backoff;
mod channel;
mod connection;

pub(crate) use channel::{ChannelManager, ChannelPool, PooledChannel};
pub(crate) use connection::Connection;
#[cfg(test)]
pub(crate) use connection::REPLY_SUCCESS;
