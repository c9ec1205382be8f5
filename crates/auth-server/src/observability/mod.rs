//! Observability for the auth server.
//!
//! # Privacy by Default
//!
//! All instrumentation uses `#[instrument(skip_all)]` and explicit safe field allow-listing.
//! Fields are categorized as:
//! - **SAFE**: Can be logged in plaintext (key ids, outcomes, rejection reasons)
//! - **HASHED**: Must be SHA-256 hashed for correlation (client_id)
//! - **NEVER**: Must never appear in logs (private keys, tokens, passwords, emails)

pub mod metrics;

use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars)
///
/// Used for fields like `client_id` that need correlation across log entries
/// but should not be stored in plaintext.
///
/// # Privacy
///
/// This is NOT cryptographically secure for secrets - it's a one-way hash
/// for correlation purposes only.
pub fn hash_for_correlation(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    // 32 bits is enough to correlate and limits reversibility
    hex::encode(result.get(..4).unwrap_or_default())
}
