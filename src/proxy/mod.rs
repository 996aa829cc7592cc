// Protocol building blocks
mod channel;
mod config;
mod envelope;
mod error;
mod random;
mod signature;
mod time_utils;
mod transport;

// Session protocols
pub mod audit_log;
pub mod time_sync;

// Monitoring
pub mod metrics;

// Aggregated HTTP endpoint
#[cfg(feature = "server")]
pub mod server;

// Building block exports
pub use channel::SignedChannel;
pub use config::{ConfigPreset, EndpointPaths, ProxyConfig, ResetPolicy};
pub use envelope::{Action, Endpoint, NumericSlot, SignedEnvelope};
pub use error::ProxyError;
pub use random::{ALPHABET, RandomSource, SeededRandom};
pub use signature::{CredentialSigner, NONCE_LENGTH, Sha256Signer};
pub use transport::{HttpTransport, Transport};

// Session exports
pub use audit_log::AuditLogSession;
pub use time_sync::TimeSyncSession;

// Metrics exports
pub use metrics::{
    ErrorMetrics, InMemoryMetricsCollector, MetricEvent, MetricsCollector, MetricsTimer,
    NoOpMetricsCollector, ProxyMetrics,
};

// Server exports
#[cfg(feature = "server")]
pub use server::{AppState, InfoResponse};
