//! Broker-level options passed through to the connection factory.
use anyhow::Context;
use native_tls::Certificate;
use serde::Deserialize;

/// Default timeout for a single dial attempt.
const DEFAULT_CONNECTION_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
/// Options that only matter to the broker session itself.
///
/// The address (scheme, credentials, host, port and vhost) is passed separately to
/// [`WorkQueue::connect`](crate::WorkQueue::connect); these settings tweak how the session
/// is established.
pub struct BrokerOptions {
    /// How long a single dial attempt may take before it is abandoned, in seconds.
    ///
    /// The whole reconnection loop is bounded separately by
    /// [`Config::max_connection_retry`](crate::Config::max_connection_retry).
    /// Defaults to 10 seconds.
    pub connection_timeout_seconds: Option<u64>,
    /// Configuration to establish an encrypted connection with the broker.
    /// If omitted the connection will be in plain text.
    pub tls: Option<TlsSettings>,
}

impl BrokerOptions {
    /// Timeout observed by a single dial attempt.
    pub fn connection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.connection_timeout_seconds
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECONDS),
        )
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
/// Configuration to establish an encrypted connection with the broker.
pub struct TlsSettings {
    /// The domain we expect as CN on the server certificate.
    /// If left unspecified, it defaults to the host of the broker address.
    pub domain: Option<String>,
    /// Root certificate chain to be trusted when validating server certificates,
    /// in PEM format.
    ///
    /// If set to `None`, the system's trust root will be used.
    ///
    /// ```text
    /// -----BEGIN CERTIFICATE-----
    /// <-- OMITTED -->
    /// -----END CERTIFICATE-----
    /// ```
    pub ca_certificate_chain_pem: Option<String>,
}

impl TlsSettings {
    /// Parses the CA certificate chain into the strongly-typed format
    /// provided by the `native_tls` crate.
    pub fn ca_certificate_chain(&self) -> Result<Option<Certificate>, anyhow::Error> {
        self.ca_certificate_chain_pem
            .as_ref()
            .map(String::as_bytes)
            .map(Certificate::from_pem)
            .transpose()
            .context("Failed to decode PEM certificate chain for the broker TLS connection.")
    }
}
