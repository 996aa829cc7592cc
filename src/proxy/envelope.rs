//! The request envelope and the action vocabulary of the upstream.

use serde::Serialize;

use super::random::RandomSource;
use super::signature::CredentialSigner;

/// One of the three upstream endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Time sync `begin` and `end`
    Access,
    /// Time sync `observe`
    Clock,
    /// Audit base, fetch and reset
    Audit,
}

impl Endpoint {
    /// Builds the numeric slot this endpoint expects.
    ///
    /// Access and clock envelopes carry `Timeout`; audit envelopes carry
    /// `Offset`.
    pub fn numeric_slot(self, value: i64) -> NumericSlot {
        match self {
            Endpoint::Access | Endpoint::Clock => NumericSlot::Timeout(value),
            Endpoint::Audit => NumericSlot::Offset(value),
        }
    }
}

/// Every action the client sends.
///
/// An action fixes both the `Act` string and the endpoint it is sent to, so
/// a signature can never be computed for one pair and sent with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Open a time sync window
    Begin,
    /// Keep the remote clock observed
    Observe,
    /// Close the window and read the server time
    End,
    /// Read the audit base offset (empty `Act`)
    AuditBase,
    /// Fetch audit entries from an offset
    AuditFetch,
    /// Advance the audit cursor
    AuditReset,
}

impl Action {
    /// The `Act` string on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Begin => "begin",
            Action::Observe => "observe",
            Action::End => "end",
            Action::AuditBase => "",
            Action::AuditFetch => "burble",
            Action::AuditReset => "chortle",
        }
    }

    /// The endpoint this action is sent to.
    pub fn endpoint(self) -> Endpoint {
        match self {
            Action::Begin | Action::End => Endpoint::Access,
            Action::Observe => Endpoint::Clock,
            Action::AuditBase | Action::AuditFetch | Action::AuditReset => Endpoint::Audit,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::AuditBase => f.write_str("<base>"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// The action-dependent numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NumericSlot {
    /// Sent to the access and clock endpoints
    Timeout(i64),
    /// Sent to the audit endpoint
    Offset(i64),
}

/// The flat JSON body of every upstream request.
///
/// ```json
/// {"Nonce": "...", "Act": "begin", "Timeout": 250000, "Signature": "..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignedEnvelope {
    /// Fresh 18-character nonce
    pub nonce: String,
    /// The action string, possibly empty
    pub act: String,
    /// `Timeout` or `Offset`
    #[serde(flatten)]
    pub slot: NumericSlot,
    /// Signature over path, action and nonce
    pub signature: String,
}

impl SignedEnvelope {
    /// Draws a fresh nonce and signs `action` for `path`.
    ///
    /// `path` must be the configured path of `action.endpoint()`.
    pub fn sign(
        action: Action,
        path: &str,
        value: i64,
        random: &dyn RandomSource,
        signer: &dyn CredentialSigner,
    ) -> Self {
        let nonce = signer.nonce(random);
        let signature = signer.signature(path, action.as_str(), &nonce);

        Self {
            nonce,
            act: action.as_str().to_string(),
            slot: action.endpoint().numeric_slot(value),
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::random::SeededRandom;
    use crate::proxy::signature::Sha256Signer;
    use serde_json::json;

    #[test]
    fn test_action_strings() {
        assert_eq!(Action::Begin.as_str(), "begin");
        assert_eq!(Action::Observe.as_str(), "observe");
        assert_eq!(Action::End.as_str(), "end");
        assert_eq!(Action::AuditBase.as_str(), "");
        assert_eq!(Action::AuditFetch.as_str(), "burble");
        assert_eq!(Action::AuditReset.as_str(), "chortle");
    }

    #[test]
    fn test_action_endpoints() {
        assert_eq!(Action::Begin.endpoint(), Endpoint::Access);
        assert_eq!(Action::End.endpoint(), Endpoint::Access);
        assert_eq!(Action::Observe.endpoint(), Endpoint::Clock);
        assert_eq!(Action::AuditBase.endpoint(), Endpoint::Audit);
        assert_eq!(Action::AuditFetch.endpoint(), Endpoint::Audit);
        assert_eq!(Action::AuditReset.endpoint(), Endpoint::Audit);
    }

    #[test]
    fn test_time_envelope_shape() {
        let random = SeededRandom::from_seed(11);
        let signer = Sha256Signer::new("secret");
        let envelope = SignedEnvelope::sign(Action::Begin, "/652/access", 250_000, &random, &signer);

        let value = serde_json::to_value(&envelope).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert_eq!(object["Act"], json!("begin"));
        assert_eq!(object["Timeout"], json!(250_000));
        assert_eq!(object["Nonce"], json!(envelope.nonce));
        assert!(!object.contains_key("Offset"));
    }

    #[test]
    fn test_audit_envelope_shape() {
        let random = SeededRandom::from_seed(11);
        let signer = Sha256Signer::new("secret");
        let envelope = SignedEnvelope::sign(Action::AuditBase, "/652/audit", 0, &random, &signer);

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["Act"], json!(""));
        assert_eq!(value["Offset"], json!(0));
        assert!(value.get("Timeout").is_none());
    }

    #[test]
    fn test_signature_covers_path_action_and_nonce() {
        let random = SeededRandom::from_seed(5);
        let signer = Sha256Signer::new("secret");
        let envelope = SignedEnvelope::sign(Action::AuditFetch, "/652/audit", 17, &random, &signer);

        signer
            .verify("/652/audit", "burble", &envelope.nonce, &envelope.signature)
            .unwrap();
        assert!(
            signer
                .verify("/652/audit", "chortle", &envelope.nonce, &envelope.signature)
                .is_err()
        );
    }

    #[test]
    fn test_each_envelope_gets_a_fresh_nonce() {
        let random = SeededRandom::from_seed(5);
        let signer = Sha256Signer::new("secret");
        let first = SignedEnvelope::sign(Action::Observe, "/652/clock", 0, &random, &signer);
        let second = SignedEnvelope::sign(Action::Observe, "/652/clock", 0, &random, &signer);

        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.signature, second.signature);
    }
}
