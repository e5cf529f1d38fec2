//! Implements [`Manager`] for [`Channel`].
use deadpool::managed::{self, Manager, Object, PoolError, TimeoutType, Timeouts};
use lapin::{options::ConfirmSelectOptions, Channel, ChannelState};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::connection::{Connection, REPLY_SUCCESS};
use crate::error::Error;

/// `ChannelPool` hands out [`Channel`]s opened on a single self-healing [`Connection`].
///
/// Up to `max_size` channels are kept around and reused. When all of them are checked
/// out, [`ChannelPool::get`] does not wait for one to come back: it opens an extra
/// channel, which is closed as soon as it is released.
pub(crate) struct ChannelPool {
    pool: managed::Pool<ChannelManager>,
}

impl ChannelPool {
    pub(crate) fn new(manager: ChannelManager, max_size: usize) -> Result<Self, Error> {
        let pool = managed::Pool::builder(manager)
            .max_size(max_size)
            .build()
            .map_err(|e| Error::Configuration(anyhow::anyhow!("{e}")))?;
        Ok(Self { pool })
    }

    /// Check a channel out: an idle pooled channel if there is one, a new one otherwise.
    ///
    /// Fails with [`Error::ChannelRetrieval`] once the connection is gone for good.
    pub(crate) async fn get(&self) -> Result<PooledChannel, Error> {
        // A zero wait makes deadpool try for a free slot without queueing.
        let timeouts = Timeouts {
            wait: Some(Duration::ZERO),
            ..Timeouts::default()
        };
        match self.pool.timeout_get(&timeouts).await {
            Ok(object) => Ok(PooledChannel::Pooled(object)),
            Err(PoolError::Timeout(TimeoutType::Wait)) => {
                debug!("Every pooled channel is checked out, opening an overflow channel");
                let channel = self
                    .pool
                    .manager()
                    .create()
                    .await
                    .map_err(PoolError::Backend)?;
                Ok(PooledChannel::Overflow(OverflowChannel(channel)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop handing out channels and drop the idle ones.
    pub(crate) fn close(&self) {
        self.pool.close();
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.pool.status().available.max(0) as usize
    }
}

/// A channel checked out of the [`ChannelPool`].
pub(crate) enum PooledChannel {
    /// Goes back to the pool when dropped.
    Pooled(Object<ChannelManager>),
    /// Opened because the pool was exhausted. Closed when dropped.
    Overflow(OverflowChannel),
}

impl PooledChannel {
    /// Close the channel instead of letting anybody reuse it.
    pub(crate) fn discard(self, reason: &'static str) {
        match self {
            PooledChannel::Pooled(object) => close_in_background(Object::take(object), reason),
            PooledChannel::Overflow(overflow) => drop(overflow),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pooled(&self) -> bool {
        matches!(self, PooledChannel::Pooled(_))
    }
}

impl Deref for PooledChannel {
    type Target = Channel;

    fn deref(&self) -> &Channel {
        match self {
            PooledChannel::Pooled(object) => object,
            PooledChannel::Overflow(overflow) => &overflow.0,
        }
    }
}

pub(crate) struct OverflowChannel(Channel);

impl Drop for OverflowChannel {
    fn drop(&mut self) {
        close_in_background(self.0.clone(), "Overflow channel released");
    }
}

/// Close `channel` on the current runtime without waiting for the broker's reply.
fn close_in_background(channel: Channel, reason: &'static str) {
    if !channel.status().connected() {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = channel.close(REPLY_SUCCESS, reason).await {
                    warn!(error = %e, reason, "Failed to close channel");
                }
            });
        }
        Err(_) => warn!(reason, "No runtime available to close channel"),
    }
}

/// `ChannelManager` implements [`Manager`] to manage a pool of [`Channel`]s.
///
/// New channels are requested from the [`Connection`], which reconnects to the broker
/// if its session went stale.
pub(crate) struct ChannelManager {
    connection: Arc<Connection>,
    publisher_confirms: bool,
}

impl ChannelManager {
    /// By default channels are not in confirm mode, see
    /// [`ChannelManager::with_publisher_confirmations`].
    pub(crate) fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            publisher_confirms: false,
        }
    }

    /// Put every new channel in confirm mode.
    pub(crate) fn with_publisher_confirmations(mut self, publisher_confirms: bool) -> Self {
        self.publisher_confirms = publisher_confirms;
        self
    }
}

#[async_trait::async_trait]
impl Manager for ChannelManager {
    type Type = Channel;
    type Error = Error;

    async fn create(&self) -> Result<Channel, Error> {
        let channel = self.connection.new_channel().await?;
        if self.publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions { nowait: false })
                .await
                .map_err(Error::OpenChannel)?;
        }
        Ok(channel)
    }

    // Idle channels are not probed when they are returned: a channel that died while
    // sitting in the pool is discarded here, on its next checkout, and replaced through
    // `create`.
    async fn recycle(&self, obj: &mut Channel) -> managed::RecycleResult<Error> {
        match obj.status().state() {
            ChannelState::Connected => Ok(()),
            state => Err(managed::RecycleError::Message(format!(
                "Channel is not in an healthy state {state:?}",
            ))),
        }
    }
}
