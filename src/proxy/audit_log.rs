//! Audit log draining: read the base offset, fetch from it, advance the cursor.
//!
//! The fetch and the reset are separate signed calls with no transaction
//! between them. A crash in between leaves the cursor where it was, so the
//! same entries are delivered again on the next drain.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::channel::SignedChannel;
use super::config::{ProxyConfig, ResetPolicy};
use super::envelope::Action;
use super::metrics::MetricEvent;
use super::random::RandomSource;
use super::signature::CredentialSigner;
use super::transport::Transport;
use crate::ProxyError;

/// Client side of the audit pagination protocol.
///
/// # Example
///
/// ```rust,no_run
/// use signed_proxy::{AuditLogSession, ConfigPreset, ProxyConfig, SignedChannel};
///
/// # async fn example() -> Result<(), signed_proxy::ProxyError> {
/// let channel = SignedChannel::from_config(ProxyConfig::from(ConfigPreset::Production))?;
/// let session = AuditLogSession::from_channel(channel);
///
/// for entry in session.handle_audit_logs().await {
///     println!("{entry}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuditLogSession {
    channel: SignedChannel,
}

impl AuditLogSession {
    /// Creates a session from its three collaborators.
    pub fn new(
        random: Arc<dyn RandomSource>,
        transport: Arc<dyn Transport>,
        signer: Arc<dyn CredentialSigner>,
        config: Arc<ProxyConfig>,
    ) -> Self {
        Self::from_channel(SignedChannel::new(random, transport, signer, config))
    }

    /// Creates a session sharing an existing channel.
    pub fn from_channel(channel: SignedChannel) -> Self {
        Self { channel }
    }

    /// The channel requests go through.
    pub fn channel(&self) -> &SignedChannel {
        &self.channel
    }

    /// Reads the current cursor position.
    ///
    /// # Errors
    ///
    /// Transport errors, or [`ProxyError::InvalidOffset`] when the trimmed body
    /// is not an integer.
    pub async fn audit_base(&self) -> Result<i64, ProxyError> {
        let body = self.channel.send(Action::AuditBase, 0).await?;
        let trimmed = body.trim();
        trimmed
            .parse()
            .map_err(|_| ProxyError::InvalidOffset(trimmed.to_string()))
    }

    /// Fetches the entries starting at `offset`.
    ///
    /// The body is split on `'\n'` without trimming, so an empty body yields
    /// a single empty entry and a trailing newline yields a trailing empty
    /// entry. Both count toward the reset target.
    pub async fn audit_log(&self, offset: i64) -> Result<Vec<String>, ProxyError> {
        let body = self.channel.send(Action::AuditFetch, offset).await?;
        Ok(split_entries(&body))
    }

    /// Acknowledges consumption up to `offset`, clamped to zero.
    ///
    /// Best effort: failures are logged and otherwise ignored.
    pub async fn reset_audit_log(&self, offset: i64) {
        let offset = offset.max(0);
        match self.channel.send(Action::AuditReset, offset).await {
            Ok(_) => debug!(offset, "audit cursor reset"),
            Err(err) => warn!(error = %err, offset, "audit cursor reset failed"),
        }
    }

    /// Drains one page of the audit log.
    ///
    /// Failures of the base or log fetch are logged and treated as an offset
    /// of `0` and an empty page. Whether the cursor is then still advanced to
    /// `base + entries - 1` depends on the configured [`ResetPolicy`].
    pub async fn handle_audit_logs(&self) -> Vec<String> {
        let (base, base_ok) = match self.audit_base().await {
            Ok(base) => (base, true),
            Err(err) => {
                warn!(error = %err, "audit base fetch failed");
                (0, false)
            }
        };

        let (entries, fetch_ok) = match self.audit_log(base).await {
            Ok(entries) => (entries, true),
            Err(err) => {
                warn!(error = %err, base, "audit log fetch failed");
                (Vec::new(), false)
            }
        };

        let reset_sent = match self.channel.config().reset_policy {
            ResetPolicy::Always => true,
            ResetPolicy::OnSuccessfulFetch => base_ok && fetch_ok,
        };

        if reset_sent {
            self.reset_audit_log(reset_target(base, entries.len())).await;
        } else {
            info!(base, "skipping audit cursor reset after failed fetch");
        }

        self.channel
            .metrics()
            .record_event(MetricEvent::AuditDrain {
                entries: entries.len(),
                reset_sent,
            })
            .await;

        entries
    }
}

fn split_entries(body: &str) -> Vec<String> {
    body.split('\n').map(str::to_string).collect()
}

/// Offset of the last delivered entry. Negative before clamping when nothing
/// was delivered from a base of zero. Saturates at the ends of `i64`.
fn reset_target(base: i64, delivered: usize) -> i64 {
    let delivered = i64::try_from(delivered).unwrap_or(i64::MAX);
    base.saturating_add(delivered).saturating_sub(1)
}
