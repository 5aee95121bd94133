//! Cache key derivation.
//!
//! A cache key is the sole identity of a stored record. For idempotent
//! requests the key is the normalized URL (fragment stripped). Requests
//! carrying a body get a content-hash suffix so distinct payloads to the
//! same URL occupy distinct cache slots:
//!
//! ```
//! use http::Method;
//! use sirocco_core::derive_key;
//!
//! let a = derive_key(&Method::POST, "https://api.example.com/search", Some(b"A"));
//! let b = derive_key(&Method::POST, "https://api.example.com/search", Some(b"B"));
//! assert_ne!(a, b);
//! assert!(a.starts_with("https://api.example.com/search-"));
//! ```
//!
//! With the default `sha` feature the suffix is the full hex SHA-256 digest.
//! Without it a 32-bit fold hash stands in: collision resistance degrades,
//! but a key is always produced.

use http::Method;
use smol_str::SmolStr;

/// Derives the cache key for a request.
///
/// `body` only participates for non-safe methods; a `GET` with a body (rare
/// but legal) keys on the URL alone, matching how such requests are routed.
pub fn derive_key(method: &Method, url: &str, body: Option<&[u8]>) -> SmolStr {
    let url = normalize_url(url);
    match body {
        Some(payload) if !method.is_safe() => {
            SmolStr::new(format!("{}-{}", url, payload_hash(payload)))
        }
        _ => SmolStr::new(url),
    }
}

/// Strips the fragment component; fragments never reach the server and must
/// not split the cache.
pub fn normalize_url(url: &str) -> &str {
    match url.split_once('#') {
        Some((before, _)) => before,
        None => url,
    }
}

#[cfg(feature = "sha")]
fn payload_hash(payload: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

#[cfg(not(feature = "sha"))]
fn payload_hash(payload: &[u8]) -> String {
    format!("{:x}", fold_hash(payload))
}

/// 32-bit fold hash over the payload bytes.
///
/// Degraded fallback used when the `sha` feature is off.
#[cfg(not(feature = "sha"))]
fn fold_hash(payload: &[u8]) -> u32 {
    let mut hash: i32 = 0;
    for &byte in payload {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(byte as i32);
    }
    hash.unsigned_abs()
}
