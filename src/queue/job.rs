use amq_protocol_types::{ChannelId, DeliveryTag};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicRejectOptions},
};
use tracing::warn;

use crate::error::Error;
use crate::pool::PooledChannel;

/// A work unit pulled from a [`Topic`](crate::Topic).
///
/// The job keeps the channel its message was delivered on until it is resolved with either
/// [`Job::done`] or [`Job::fail`]; both consume the job, so a delivery cannot be resolved
/// twice. Resolving the job hands the channel back to the pool.
///
/// # Dropping an unresolved job
///
/// A job dropped without being resolved closes its channel instead of handing it back:
/// the broker then makes the message available again to other consumers.
pub struct Job {
    topic: String,
    delivery: Delivery,
    channel: Option<PooledChannel>,
}

impl Job {
    pub(crate) fn new(topic: String, delivery: Delivery, channel: PooledChannel) -> Self {
        Self {
            topic,
            delivery,
            channel: Some(channel),
        }
    }

    /// Mark the job as completed: the message is removed from the queue.
    ///
    /// If this fails, the fate of the message is unknown and it may be delivered again.
    #[tracing::instrument(name = "job_done", skip(self), fields(topic = %self.topic, delivery_tag = self.delivery.delivery_tag))]
    pub async fn done(mut self) -> Result<(), Error> {
        let channel = self.release();
        let delivery_tag = self.delivery.delivery_tag;
        channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
            .map_err(|source| Error::Ack {
                delivery_tag,
                source,
            })
    }

    /// Mark the job as failed. If `requeue` is true the message goes back to the queue,
    /// otherwise it is dropped (or dead-lettered, if the queue is configured to do so).
    ///
    /// If this fails, the fate of the message is unknown and it may be delivered again.
    #[tracing::instrument(name = "job_fail", skip(self), fields(topic = %self.topic, delivery_tag = self.delivery.delivery_tag))]
    pub async fn fail(mut self, requeue: bool) -> Result<(), Error> {
        let channel = self.release();
        let delivery_tag = self.delivery.delivery_tag;
        channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|source| Error::Reject {
                delivery_tag,
                source,
            })
    }

    /// The job's payload.
    pub fn body(&self) -> &[u8] {
        &self.delivery.data
    }

    /// The underlying AMQP delivery, for when the body is not enough (headers, properties).
    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub fn delivery_tag(&self) -> DeliveryTag {
        self.delivery.delivery_tag
    }

    /// Whether the broker delivered this message before to somebody who did not ack it.
    pub fn redelivered(&self) -> bool {
        self.delivery.redelivered
    }

    /// Identifier of the channel the job holds until it is resolved.
    pub fn channel_id(&self) -> ChannelId {
        self.channel
            .as_ref()
            .map(|channel| channel.id())
            .expect("A job holds its channel until it is resolved")
    }

    /// Name of the topic the job was pulled from.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn release(&mut self) -> PooledChannel {
        self.channel
            .take()
            .expect("A job holds its channel until it is resolved")
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("topic", &self.topic)
            .field("delivery_tag", &self.delivery.delivery_tag)
            .field("redelivered", &self.delivery.redelivered)
            .finish()
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        warn!(
            topic = %self.topic,
            delivery_tag = self.delivery.delivery_tag,
            "Job dropped without being resolved, closing its channel"
        );
        // An unacked delivery must not ride along on a channel somebody else reuses.
        channel.discard("Unresolved job");
    }
}
