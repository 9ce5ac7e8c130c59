//! HMAC-SHA256 webhook signatures.
//!
//! Providers send a header of the form `t=<unix seconds>,v1=<hex>` where the
//! signature covers `"{t}.{raw body}"`. Several `v1` entries may appear
//! while the provider itself is rotating.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{IngestError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Verifies webhook signatures against an ordered list of trusted keys.
///
/// Keys are tried in order (primary first, then secondary), so a new key
/// can be rolled out before the old one is retired.
#[derive(Clone)]
pub struct SignatureVerifier {
    keys: Vec<String>,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("keys", &self.keys.len())
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl SignatureVerifier {
    /// Creates a verifier. Blank keys are dropped.
    pub fn new<I, K>(keys: I, tolerance: Duration) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys = keys
            .into_iter()
            .map(|k| {
                let k: String = k.into();
                k.trim().to_string()
            })
            .filter(|k| !k.is_empty())
            .collect();
        Self { keys, tolerance }
    }

    /// Returns the number of trusted keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Verifies a signature header against the raw body.
    ///
    /// Returns the index of the key that matched. With no keys configured
    /// every request is rejected.
    pub fn verify(&self, header: Option<&str>, body: &[u8], now: DateTime<Utc>) -> Result<usize> {
        if self.keys.is_empty() {
            return Err(IngestError::InvalidSignature(
                "no signing keys configured".to_string(),
            ));
        }

        let header = header
            .ok_or_else(|| IngestError::InvalidSignature("missing signature header".to_string()))?;
        let (timestamp, signatures) = parse_header(header)?;

        let skew = (now.timestamp() - timestamp).abs();
        if skew > self.tolerance.num_seconds() {
            return Err(IngestError::InvalidSignature(format!(
                "timestamp outside tolerance by {skew}s"
            )));
        }

        for (index, key) in self.keys.iter().enumerate() {
            for signature in &signatures {
                if verify_one(key, timestamp, body, signature) {
                    return Ok(index);
                }
            }
        }

        Err(IngestError::InvalidSignature(
            "no trusted key matched".to_string(),
        ))
    }

    /// Computes the hex signature for a payload.
    pub fn sign(key: &str, timestamp: i64, body: &[u8]) -> Result<String> {
        let mac = mac_for(key, timestamp, body)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Builds a complete signature header for a payload.
    pub fn header_for(key: &str, timestamp: i64, body: &[u8]) -> Result<String> {
        Ok(format!("t={timestamp},v1={}", Self::sign(key, timestamp, body)?))
    }
}

fn mac_for(key: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| IngestError::InvalidSignature(format!("unusable signing key: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

fn verify_one(key: &str, timestamp: i64, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    match mac_for(key, timestamp, body) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<String>)> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((name, value)) = part.trim().split_once('=') else {
            continue;
        };
        match name {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    IngestError::InvalidSignature("malformed timestamp".to_string())
                })?);
            }
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| IngestError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(IngestError::InvalidSignature(
            "missing v1 signature".to_string(),
        ));
    }
    Ok((timestamp, signatures))
}
