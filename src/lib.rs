//! # Signed Proxy
//!
//! A client for a remote service that speaks a signed-request protocol,
//! plus a small HTTP server that aggregates its two conversations into one
//! response.
//!
//! Every request to the upstream is a flat JSON envelope carrying a fresh
//! nonce and a SHA-256 signature over the endpoint path, the action, the
//! nonce and a shared secret. On top of that the crate implements the two
//! stateful exchanges the upstream offers:
//!
//! - **Time sync**: `begin` on the access endpoint, repeated `observe` calls
//!   on the clock endpoint while `begin` is in flight, then `end`, whose body
//!   is the server time.
//! - **Audit log**: read the cursor offset, fetch entries from it, then move
//!   the cursor to the last delivered entry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use signed_proxy::{AuditLogSession, ConfigPreset, ProxyConfig, SignedChannel, TimeSyncSession};
//!
//! # async fn example() -> Result<(), signed_proxy::ProxyError> {
//! let channel = SignedChannel::from_config(ProxyConfig::from(ConfigPreset::FromEnv))?;
//!
//! let time_sync = TimeSyncSession::from_channel(channel.clone());
//! let audit_log = AuditLogSession::from_channel(channel);
//!
//! let server_time = time_sync.handle_server_time().await?;
//! let entries = audit_log.handle_audit_logs().await;
//! println!("{server_time}: {} audit entries", entries.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Signing
//!
//! ```rust
//! use signed_proxy::{CredentialSigner, SeededRandom, Sha256Signer};
//!
//! let signer = Sha256Signer::new("shared-secret");
//! let random = SeededRandom::from_seed(7);
//!
//! let nonce = signer.nonce(&random);
//! let signature = signer.signature("/652/audit", "burble", &nonce);
//! assert!(signer.verify("/652/audit", "burble", &nonce, &signature).is_ok());
//! ```
//!
//! ## Configuration
//!
//! Base URL, secret, endpoint paths and timeouts are read from `SIGNED_PROXY_*`
//! environment variables (see [`ConfigPreset::FromEnv`]); the listen port of
//! the bundled server comes from `PORT` and defaults to `9090`.
//!
//! ## Architecture
//!
//! - **[`RandomSource`]** / **[`SeededRandom`]**: nonce material
//! - **[`CredentialSigner`]** / **[`Sha256Signer`]**: nonces and signatures
//! - **[`Transport`]** / **[`HttpTransport`]**: timeout-bounded POST
//! - **[`SignedChannel`]**: the three above plus configuration
//! - **[`TimeSyncSession`]** and **[`AuditLogSession`]**: the two protocols
//! - **[`ProxyError`]**: error handling for all failure modes

pub mod proxy;

// Re-export commonly used types
pub use proxy::{
    Action, AuditLogSession, ConfigPreset, CredentialSigner, Endpoint, EndpointPaths,
    HttpTransport, InMemoryMetricsCollector, MetricEvent, MetricsCollector, NoOpMetricsCollector,
    NumericSlot, ProxyConfig, ProxyError, ProxyMetrics, RandomSource, ResetPolicy, SeededRandom,
    Sha256Signer, SignedChannel, SignedEnvelope, TimeSyncSession, Transport,
};
