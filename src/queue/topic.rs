use lapin::{
    options::{BasicGetOptions, BasicPublishOptions},
    publisher_confirm::Confirmation,
};

use crate::error::Error;
use crate::queue::{Job, Publishing, WorkQueue, PERSISTENT, TRANSIENT};

/// A named "tube" jobs are put into and exclusively pulled from.
///
/// Underneath, a topic is a queue bound to the work queue's direct exchange, using the
/// topic name as both queue name and routing key. Topics do not own a channel: every
/// operation borrows one from the work queue's pool.
///
/// Get one with [`WorkQueue::topic`]. Handles are cheap to clone, and two handles with the
/// same name refer to the same underlying queue.
#[derive(Clone, Debug)]
pub struct Topic {
    name: String,
    queue: WorkQueue,
}

impl Topic {
    pub(crate) fn new(name: String, queue: WorkQueue) -> Self {
        Self { name, queue }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until a job is available and return it.
    ///
    /// The queue is polled with `basic.get`; between two empty polls the task sleeps for
    /// [`Config::pull_interval`](crate::Config::pull_interval), or just yields if that is
    /// zero. There is no timeout: wrap the future in [`tokio::time::timeout`] if you need
    /// one.
    ///
    /// The channel used to retrieve the message stays with the returned [`Job`] until the
    /// job is resolved.
    #[tracing::instrument(name = "topic_pull", skip(self), fields(topic = %self.name))]
    pub async fn pull(&self) -> Result<Job, Error> {
        let channel = self.queue.channel().await?;
        let pull_interval = self.queue.config().pull_interval;
        loop {
            let message = channel
                .basic_get(&self.name, BasicGetOptions { no_ack: false })
                .await
                .map_err(|source| Error::Get {
                    topic: self.name.clone(),
                    source,
                })?;
            if let Some(message) = message {
                return Ok(Job::new(self.name.clone(), message.delivery, channel));
            }
            if pull_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(pull_interval).await;
            }
        }
    }

    /// Put a job with the given body into the topic.
    ///
    /// Messages are persistent if the work queue is. Use [`Topic::put_publishing`] if you
    /// need more control over the message.
    pub async fn put(&self, body: impl Into<Vec<u8>>) -> Result<(), Error> {
        let delivery_mode = if self.queue.config().persistent {
            PERSISTENT
        } else {
            TRANSIENT
        };
        self.put_publishing(Publishing::new(body).with_delivery_mode(delivery_mode))
            .await
    }

    /// Put a message into the topic, with full control over its AMQP properties.
    #[tracing::instrument(name = "topic_put", level = "debug", skip(self, publishing), fields(topic = %self.name))]
    pub async fn put_publishing(&self, publishing: Publishing) -> Result<(), Error> {
        let channel = self.queue.channel().await?;
        let options = BasicPublishOptions {
            mandatory: false,
            // The immediate flag was dropped in RabbitMQ 3.0, setting it causes a
            // not-supported error.
            immediate: false,
        };
        let publish_error = |source| Error::Publish {
            topic: self.name.clone(),
            source,
        };

        let confirmation = channel
            .basic_publish(
                &self.queue.config().exchange_name,
                &self.name,
                options,
                &publishing.body,
                publishing.properties,
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        match confirmation {
            Confirmation::Nack(_) => Err(Error::NegativeAck {
                topic: self.name.clone(),
            }),
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        }
    }
}
