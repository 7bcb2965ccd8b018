//! Billing webhook signature verification
//!
//! Header format: `t=<unix seconds>,v1=<hex HMAC-SHA256(secret, "<t>.<body>")>`.
//! Several `v1` entries may be present while the provider rotates secrets; any
//! match is accepted. Verification has no side effects.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use super::billing_event::{BillingEvent, EventEnvelope};

/// Request header carrying the provider signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Missing stripe-signature header")]
    MissingSignature,

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Signed correctly but not an event envelope; redelivery will not help
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

/// Verifies inbound webhook bodies against the shared signing secret
#[derive(Clone)]
pub struct EventVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl EventVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: i64::try_from(tolerance_secs).unwrap_or(i64::MAX),
        }
    }

    /// Authenticate `body` and parse it into a [`BillingEvent`]
    pub fn verify(
        &self,
        body: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BillingEvent, VerificationError> {
        let header = signature
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(VerificationError::MissingSignature)?;

        let parsed = parse_signature_header(header)?;

        // `t` is attacker-controlled until the MAC checks out
        let skew = now
            .timestamp()
            .checked_sub(parsed.timestamp)
            .and_then(i64::checked_abs);
        match skew {
            Some(skew) if skew <= self.tolerance_secs => {}
            Some(skew) => {
                return Err(VerificationError::InvalidSignature(format!(
                    "timestamp {} is {}s away from now",
                    parsed.timestamp, skew
                )));
            }
            None => {
                return Err(VerificationError::InvalidSignature(format!(
                    "timestamp {} is out of range",
                    parsed.timestamp
                )));
            }
        }

        let mac = signing_mac(&self.secret, parsed.timestamp, body)?;
        let matched = parsed
            .candidates
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok());
        if !matched {
            return Err(VerificationError::InvalidSignature(
                "no signature matched".to_string(),
            ));
        }

        let raw = std::str::from_utf8(body)
            .map_err(|e| VerificationError::MalformedEvent(e.to_string()))?;
        let envelope: EventEnvelope = serde_json::from_str(raw)
            .map_err(|e| VerificationError::MalformedEvent(e.to_string()))?;
        if envelope.id.trim().is_empty() {
            return Err(VerificationError::MalformedEvent("empty event id".to_string()));
        }

        debug!(event_id = %envelope.id, kind = %envelope.kind, "Webhook signature verified");
        Ok(BillingEvent::from_envelope(envelope, raw.to_string()))
    }
}

/// Produce a header value for `payload` signed at `timestamp`
///
/// Mirrors the provider's scheme; used by local tooling that replays events.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let signature = match signing_mac(secret, timestamp, payload) {
        Ok(mac) => hex::encode(mac.finalize().into_bytes()),
        Err(_) => String::new(),
    };
    format!("t={},v1={}", timestamp, signature)
}

struct SignatureHeader {
    timestamp: i64,
    candidates: Vec<Vec<u8>>,
}

fn parse_signature_header(header: &str) -> Result<SignatureHeader, VerificationError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            // Undecodable entries cannot match; skip them rather than fail the header
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        VerificationError::InvalidSignature("header has no timestamp".to_string())
    })?;
    if candidates.is_empty() {
        return Err(VerificationError::InvalidSignature(
            "header has no v1 signature".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        candidates,
    })
}

fn signing_mac(secret: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256, VerificationError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| VerificationError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}
