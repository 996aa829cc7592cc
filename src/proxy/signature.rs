//! Request credentials: nonces and signatures bound to a path and action.
//!
//! Every envelope sent upstream carries a fresh nonce and a signature computed
//! over exactly that nonce and the (path, action) pair it is sent with. The
//! upstream recomputes the same digest with its copy of the shared secret.

use base64::Engine;
use sha2::{Digest, Sha256};

use super::random::RandomSource;
use crate::ProxyError;

/// Length of the nonce placed in every envelope.
pub const NONCE_LENGTH: usize = 18;

/// A trait for the credentialing half of the signed-request protocol.
///
/// # Implementation Notes
///
/// - `signature` must be a pure function of its inputs and the secret
/// - `verify` should compare in constant time
/// - Implementations must be `Send + Sync`; sessions share them via `Arc`
///
/// # Example
///
/// ```rust
/// use signed_proxy::{CredentialSigner, SeededRandom, Sha256Signer};
///
/// let signer = Sha256Signer::new("shared-secret");
/// let random = SeededRandom::from_time_seed();
///
/// let nonce = signer.nonce(&random);
/// let signature = signer.signature("/652/clock", "observe", &nonce);
/// signer.verify("/652/clock", "observe", &nonce, &signature)?;
/// # Ok::<(), signed_proxy::ProxyError>(())
/// ```
pub trait CredentialSigner: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Draws a fresh nonce from `random`.
    fn nonce(&self, random: &dyn RandomSource) -> String {
        random.generate(NONCE_LENGTH)
    }

    /// Computes the signature for one request.
    ///
    /// `path` is the endpoint path (for example `/652/audit`), never the full
    /// URL.
    fn signature(&self, path: &str, action: &str, nonce: &str) -> String;

    /// Checks a signature received for the given path, action and nonce.
    ///
    /// # Returns
    ///
    /// `Ok(())` if it matches, `Err(ProxyError::InvalidSignature)` otherwise.
    fn verify(
        &self,
        path: &str,
        action: &str,
        nonce: &str,
        signature: &str,
    ) -> Result<(), ProxyError> {
        let expected = self.signature(path, action, nonce);
        if constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            Ok(())
        } else {
            Err(ProxyError::InvalidSignature)
        }
    }
}

/// SHA-256 over the CRLF-joined canonical string, base64 (standard) encoded.
///
/// The digest input is exactly:
///
/// ```text
/// {path}\r\n{action}\r\n{nonce}\r\n{secret}
/// ```
///
/// with no trailing separator. Any change to this layout breaks every request
/// against the real upstream.
#[derive(Clone)]
pub struct Sha256Signer {
    secret: String,
}

impl Sha256Signer {
    /// Creates a signer holding the shared secret.
    ///
    /// The secret is only ever hashed; it is never serialized into an
    /// envelope or printed by `Debug`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Sha256Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sha256Signer")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl CredentialSigner for Sha256Signer {
    fn name(&self) -> &'static str {
        "sha256-crlf"
    }

    fn signature(&self, path: &str, action: &str, nonce: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update(b"\r\n");
        hasher.update(action.as_bytes());
        hasher.update(b"\r\n");
        hasher.update(nonce.as_bytes());
        hasher.update(b"\r\n");
        hasher.update(self.secret.as_bytes());

        base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
