//! A self-healing broker session.
use crate::amqp::ConnectionFactory;
use crate::error::{DialError, Error};
use crate::pool::backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Attempts are never given less time than this, even when the budget is almost spent.
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(100);

/// Reply code sent to the broker on a clean shutdown.
pub(crate) const REPLY_SUCCESS: u16 = 200;

enum Session {
    Disconnected,
    Connected {
        connection: Arc<lapin::Connection>,
        /// Bumped on every successful dial, used to tell whether a session a caller saw
        /// failing has already been replaced by somebody else.
        generation: u64,
    },
    /// The retry budget was exhausted. Nothing will be dialed again.
    Failed { attempts: u32, error: DialError },
    Closed,
}

struct State {
    session: Session,
    generation: u64,
}

/// Owns the single session with the broker.
///
/// Dialing happens with exponential backoff inside a critical section: concurrent callers
/// queue up on the lock and observe the outcome of the attempt in flight instead of
/// dialing on their own.
pub(crate) struct Connection {
    factory: ConnectionFactory,
    max_connection_retry: Duration,
    state: Mutex<State>,
}

impl Connection {
    pub(crate) fn new(factory: ConnectionFactory, max_connection_retry: Duration) -> Self {
        Self {
            factory,
            max_connection_retry,
            state: Mutex::new(State {
                session: Session::Disconnected,
                generation: 0,
            }),
        }
    }

    /// Establish the session, retrying with backoff until `max_connection_retry` elapses.
    ///
    /// It is a no-op if a live session is already stored.
    pub(crate) async fn connect(&self) -> Result<(), Error> {
        self.redial(None).await
    }

    /// Open a new channel, transparently reconnecting if the session went stale.
    #[tracing::instrument(name = "broker_create_channel", skip(self))]
    pub(crate) async fn new_channel(&self) -> Result<lapin::Channel, Error> {
        loop {
            let stale = match self.session().await? {
                Some((connection, generation)) => match connection.create_channel().await {
                    Ok(channel) => return Ok(channel),
                    // The session is fine, it is the channel that cannot be opened
                    // (e.g. the channel limit was hit): redialing would not help.
                    Err(e) if connection.status().connected() => {
                        return Err(Error::OpenChannel(e))
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to open a channel on a stale session, reconnecting");
                        Some(generation)
                    }
                },
                None => None,
            };
            self.redial(stale).await?;
        }
    }

    /// Close the session. No reconnection will be attempted afterwards.
    #[tracing::instrument(name = "broker_close", skip(self))]
    pub(crate) async fn close(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let session = std::mem::replace(&mut state.session, Session::Closed);
        match session {
            Session::Connected { connection, .. } => connection
                .close(REPLY_SUCCESS, "Normal shutdown")
                .await
                .map_err(Error::Close),
            _ => Ok(()),
        }
    }

    /// Snapshot the current session, failing fast if the connection is gone for good.
    async fn session(&self) -> Result<Option<(Arc<lapin::Connection>, u64)>, Error> {
        let state = self.state.lock().await;
        match &state.session {
            Session::Connected {
                connection,
                generation,
            } => Ok(Some((Arc::clone(connection), *generation))),
            Session::Disconnected => Ok(None),
            Session::Failed { attempts, error } => Err(Error::ConnectionFailed {
                attempts: *attempts,
                source: error.clone(),
            }),
            Session::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// Replace the session unless somebody else already replaced `stale` while we were
    /// waiting for the lock.
    async fn redial(&self, stale: Option<u64>) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        match &state.session {
            Session::Connected { generation, .. } if stale != Some(*generation) => {
                return Ok(())
            }
            Session::Failed { attempts, error } => {
                return Err(Error::ConnectionFailed {
                    attempts: *attempts,
                    source: error.clone(),
                })
            }
            Session::Closed => return Err(Error::ConnectionClosed),
            Session::Connected { .. } | Session::Disconnected => {}
        }

        state.session = Session::Disconnected;
        match self.dial_with_backoff().await {
            Ok(connection) => {
                state.generation += 1;
                debug!(generation = state.generation, "Connected to the broker");
                state.session = Session::Connected {
                    connection: Arc::new(connection),
                    generation: state.generation,
                };
                Ok(())
            }
            Err((attempts, e)) => {
                error!(attempts, error = %e, "Giving up on connecting to the broker");
                state.session = Session::Failed {
                    attempts,
                    error: e.clone(),
                };
                Err(Error::ConnectionFailed {
                    attempts,
                    source: e,
                })
            }
        }
    }

    async fn dial_with_backoff(&self) -> Result<lapin::Connection, (u32, DialError)> {
        let mut backoff = ExponentialBackoff::new(self.max_connection_retry);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let deadline = backoff
                .remaining()
                .max(MIN_ATTEMPT_TIMEOUT)
                .min(self.factory.connection_timeout());
            let e = match self.factory.new_connection(deadline).await {
                Ok(connection) => return Ok(connection),
                Err(e) => e,
            };
            match backoff.next_backoff() {
                Some(delay) => {
                    warn!(attempt = attempts, error = %e, retry_in = ?delay, "Failed to connect to the broker");
                    tokio::time::sleep(delay).await;
                }
                None => return Err((attempts, e)),
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn current(&self) -> Option<Arc<lapin::Connection>> {
        match self.session().await {
            Ok(Some((connection, _))) => Some(connection),
            _ => None,
        }
    }
}
