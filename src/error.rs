//! Errors returned by the work queue and its building blocks.
use amq_protocol_types::DeliveryTag;
use std::time::Duration;

/// A single failed attempt at dialing the broker.
///
/// It is cheap to clone so that the last attempt can be kept around once the
/// retry budget is exhausted and replayed to every later caller.
#[derive(thiserror::Error, Debug, Clone)]
pub enum DialError {
    #[error("failed to connect to the broker")]
    Broker(#[source] lapin::Error),
    #[error("timed out after {0:?} while trying to connect to the broker")]
    Timeout(Duration),
}

/// Error returned by [`WorkQueue`](crate::WorkQueue), [`Topic`](crate::Topic)
/// and [`Job`](crate::Job) operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid work queue configuration")]
    Configuration(#[source] anyhow::Error),
    /// The reconnection budget was exhausted. Terminal: every later request on the same
    /// connection fails with this error without dialing again.
    #[error("queue connection failed permanently after {attempts} attempt(s)")]
    ConnectionFailed {
        attempts: u32,
        #[source]
        source: DialError,
    },
    #[error("the queue connection has been closed")]
    ConnectionClosed,
    #[error("failed to open a channel on a live connection")]
    OpenChannel(#[source] lapin::Error),
    /// The pool could not hand out a channel because the connection is gone for good.
    #[error("channel retrieval failed permanently")]
    ChannelRetrieval(#[source] Box<Error>),
    #[error("the channel pool is unavailable")]
    Pool(#[source] anyhow::Error),
    #[error("error declaring exchange `{exchange}`")]
    DeclareExchange {
        exchange: String,
        #[source]
        source: lapin::Error,
    },
    #[error("error declaring queue `{queue}`")]
    DeclareQueue {
        queue: String,
        #[source]
        source: lapin::Error,
    },
    #[error("unable to bind queue `{queue}` to exchange `{exchange}`")]
    BindQueue {
        queue: String,
        exchange: String,
        #[source]
        source: lapin::Error,
    },
    #[error("error getting message from topic `{topic}`")]
    Get {
        topic: String,
        #[source]
        source: lapin::Error,
    },
    #[error("error publishing message to topic `{topic}`")]
    Publish {
        topic: String,
        #[source]
        source: lapin::Error,
    },
    #[error("the broker nacked the message published to topic `{topic}`")]
    NegativeAck { topic: String },
    #[error("error acknowledging delivery {delivery_tag}")]
    Ack {
        delivery_tag: DeliveryTag,
        #[source]
        source: lapin::Error,
    },
    #[error("error rejecting delivery {delivery_tag}")]
    Reject {
        delivery_tag: DeliveryTag,
        #[source]
        source: lapin::Error,
    },
    #[error("error closing connection")]
    Close(#[source] lapin::Error),
}

impl Error {
    /// Whether the error means the underlying connection is gone for good.
    ///
    /// Retrying an operation that failed with a terminal error is pointless: build a new
    /// [`WorkQueue`](crate::WorkQueue) instead.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionClosed => true,
            Self::ChannelRetrieval(inner) => inner.is_terminal(),
            _ => false,
        }
    }
}

impl From<deadpool::managed::PoolError<Error>> for Error {
    fn from(err: deadpool::managed::PoolError<Error>) -> Self {
        match err {
            deadpool::managed::PoolError::Backend(e) if e.is_terminal() => {
                Self::ChannelRetrieval(Box::new(e))
            }
            deadpool::managed::PoolError::Backend(e) => e,
            err => Self::Pool(anyhow::anyhow!("{err}")),
        }
    }
}
