use thiserror::Error;

/// Error types that can occur while talking to the signed upstream.
///
/// Callers inside this crate treat most of these as opaque: the time sync
/// session only surfaces the error of its final `end` call, and the audit log
/// session logs and swallows everything. The variants exist so that logs and
/// embedding applications can still tell a timeout from a garbled body.
///
/// # Error Categories
///
/// - **Transport Errors**: `Transport`, `Timeout`
/// - **Serialization Errors**: `Serialization`, `InvalidOffset`
/// - **Protocol Errors**: `InvalidSignature`
/// - **Setup Errors**: `Config`
///
/// # Example
///
/// ```rust
/// use signed_proxy::ProxyError;
///
/// fn describe(err: &ProxyError) -> &'static str {
///     match err {
///         ProxyError::Timeout => "upstream too slow",
///         ProxyError::InvalidOffset(_) => "audit base was not a number",
///         _ => "other failure",
///     }
/// }
///
/// assert_eq!(describe(&ProxyError::Timeout), "upstream too slow");
/// ```
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The request could not be delivered or its body could not be read.
    ///
    /// Covers DNS failures, refused connections, TLS failures and
    /// interrupted response bodies. The message is the transport's own
    /// description of the failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The upstream did not answer within the configured request timeout.
    #[error("Request timed out")]
    Timeout,

    /// The request envelope could not be encoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The audit endpoint returned a body that is not an integer offset.
    ///
    /// The offending (trimmed) body is carried for logging.
    #[error("Invalid audit offset: {0:?}")]
    InvalidOffset(String),

    /// A signature did not match the one recomputed for its envelope.
    ///
    /// # When This Occurs
    ///
    /// - Client and upstream are configured with different secrets
    /// - The signature was computed for another path or action
    /// - The nonce was altered after signing
    #[error("Invalid signature")]
    InvalidSignature,

    /// The configuration could not be turned into working components.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Stable code used when reporting this error to metrics.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::Transport(_) => "transport",
            ProxyError::Timeout => "timeout",
            ProxyError::Serialization(_) => "serialization",
            ProxyError::InvalidOffset(_) => "invalid_offset",
            ProxyError::InvalidSignature => "invalid_signature",
            ProxyError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout
        } else {
            ProxyError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Serialization(err.to_string())
    }
}
