use amq_protocol_types::{FieldTable, ShortShortUInt, ShortString, Timestamp};
use lapin::BasicProperties;

/// Delivery mode of messages that only live in memory.
pub const TRANSIENT: ShortShortUInt = 1;
/// Delivery mode of messages written to disk by the broker.
pub const PERSISTENT: ShortShortUInt = 2;

/// A message to be put into a [`Topic`](crate::Topic).
///
/// The exchange and routing key are chosen by the topic, so a `Publishing` only carries
/// the payload and its AMQP properties. Use [`Topic::put`](crate::Topic::put) if the body
/// is all you care about.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Publishing {
    /// The body of the message - as a sequence of bytes.
    pub body: Vec<u8>,
    /// AMQP properties attached to the message.
    pub properties: BasicProperties,
}

impl Publishing {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            properties: BasicProperties::default(),
        }
    }

    pub fn with_body(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.body = value.into();
        self
    }

    pub fn with_properties(mut self, value: BasicProperties) -> Self {
        self.properties = value;
        self
    }

    fn props(mut self, f: impl FnOnce(BasicProperties) -> BasicProperties) -> Self {
        self.properties = f(self.properties);
        self
    }

    /// [`TRANSIENT`] or [`PERSISTENT`].
    pub fn with_delivery_mode(self, value: ShortShortUInt) -> Self {
        self.props(|p| p.with_delivery_mode(value))
    }

    pub fn with_content_type(self, value: ShortString) -> Self {
        self.props(|p| p.with_content_type(value))
    }

    pub fn with_content_encoding(self, value: ShortString) -> Self {
        self.props(|p| p.with_content_encoding(value))
    }

    pub fn with_headers(self, value: FieldTable) -> Self {
        self.props(|p| p.with_headers(value))
    }

    pub fn with_correlation_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_correlation_id(value))
    }

    pub fn with_reply_to(self, value: ShortString) -> Self {
        self.props(|p| p.with_reply_to(value))
    }

    pub fn with_expiration(self, value: ShortString) -> Self {
        self.props(|p| p.with_expiration(value))
    }

    pub fn with_message_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_message_id(value))
    }

    pub fn with_timestamp(self, value: Timestamp) -> Self {
        self.props(|p| p.with_timestamp(value))
    }

    pub fn with_type(self, value: ShortString) -> Self {
        self.props(|p| p.with_type(value))
    }

    pub fn with_app_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_app_id(value))
    }

    /// Whether the broker is asked to write the message to disk.
    pub fn is_persistent(&self) -> bool {
        *self.properties.delivery_mode() == Some(PERSISTENT)
    }
}
