//! # Webhook Signature Verification
//!
//! Verifies the `X-Reports-Signature` header on inbound scheduler webhooks
//! using HMAC-SHA256 over the raw request body with constant-time comparison.
//!
//! Two signing keys may be configured at once (current and next) so keys can
//! be rotated without dropping triggers signed with either key during the
//! rotation window.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded body signature.
pub const SIGNATURE_HEADER: &str = "X-Reports-Signature";

/// Errors that can occur during webhook signature verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Invalid timestamp: {detail}")]
    InvalidTimestamp { detail: String },

    #[error("Timestamp too old: {seconds}s old, max allowed: {max_seconds}s")]
    TimestampTooOld { seconds: u64, max_seconds: u64 },

    #[error("Timestamp too far in future: {seconds}s in future, max allowed: {max_seconds}s")]
    TimestampTooFuture { seconds: u64, max_seconds: u64 },

    #[error("Webhook signature verification is not configured")]
    NotConfigured,
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

/// Result type for webhook verification
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Verifies the report-trigger signature against a single signing key.
pub fn verify_signature(body: &[u8], signature_header: &str, key: &str) -> VerificationResult<()> {
    if signature_header.is_empty() {
        return Err(VerificationError::MissingSignature {
            header: SIGNATURE_HEADER.to_string(),
        });
    }

    let signature_prefix = "sha256=";
    if !signature_header.starts_with(signature_prefix) {
        return Err(VerificationError::InvalidSignatureFormat {
            header: format!("{} must start with 'sha256='", SIGNATURE_HEADER),
        });
    }

    let provided_hex = &signature_header[signature_prefix.len()..];

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(body);
    let expected_bytes = mac.finalize().into_bytes();

    let provided_bytes =
        hex::decode(provided_hex).map_err(|_| VerificationError::InvalidSignatureFormat {
            header: format!("{} contains invalid hex", SIGNATURE_HEADER),
        })?;

    // Constant-time comparison to prevent timing attacks
    let expected_bytes_array: &[u8] = expected_bytes.as_ref();
    if subtle::ConstantTimeEq::ct_eq(expected_bytes_array, &provided_bytes[..]).into() {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

/// Verifies the signature against the current signing key, falling back to
/// the next key if one is configured.
pub fn verify_with_rotation(
    config: &AppConfig,
    body: &[u8],
    signature_header: &str,
) -> VerificationResult<()> {
    let Some(current) = config.webhook_signing_key.as_deref() else {
        return Err(VerificationError::NotConfigured);
    };

    debug!(body_size = body.len(), "Verifying webhook signature");

    match verify_signature(body, signature_header, current) {
        Ok(()) => Ok(()),
        Err(VerificationError::VerificationFailed) => {
            if let Some(next) = config.webhook_signing_key_next.as_deref() {
                verify_signature(body, signature_header, next)
            } else {
                Err(VerificationError::VerificationFailed)
            }
        }
        Err(other) => Err(other),
    }
}

/// Checks a trigger timestamp (seconds since epoch) against the configured
/// tolerance window.
pub fn check_timestamp(timestamp: u64, tolerance_seconds: u64) -> VerificationResult<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| VerificationError::InvalidTimestamp {
            detail: "Failed to get current time".to_string(),
        })?
        .as_secs();

    let time_diff = now.abs_diff(timestamp);

    if time_diff > tolerance_seconds {
        if now > timestamp {
            return Err(VerificationError::TimestampTooOld {
                seconds: time_diff,
                max_seconds: tolerance_seconds,
            });
        } else {
            return Err(VerificationError::TimestampTooFuture {
                seconds: time_diff,
                max_seconds: tolerance_seconds,
            });
        }
    }

    Ok(())
}

/// Computes the signature header value for a body and key (used by tests and
/// local tooling).
pub fn sign_body(body: &[u8], key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
