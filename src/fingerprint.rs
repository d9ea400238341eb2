//! Request fingerprinting for deterministic request identity

use sha2::{Digest, Sha256};

/// Compute the SHA-256 identity of a request
///
/// The fingerprint includes:
/// 1. Method (uppercase normalized)
/// 2. Url (trailing slash stripped)
/// 3. Headers (sorted, normalized)
/// 4. Body
#[must_use]
pub fn fingerprint(method: &str, url: &str, headers: &[(String, String)], body: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();

    let method = method.to_uppercase();
    hasher.update((method.len() as u32).to_le_bytes());
    hasher.update(method.as_bytes());

    let url = normalize_url(url);
    hasher.update((url.len() as u32).to_le_bytes());
    hasher.update(url.as_bytes());

    let mut headers: Vec<(String, &str)> = headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.trim()))
        .collect();
    headers.sort();
    hasher.update((headers.len() as u32).to_le_bytes());
    for (name, value) in &headers {
        hasher.update((name.len() as u32).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u32).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    hasher.update((body.len() as u32).to_le_bytes());
    hasher.update(body);

    hasher.finalize().into()
}

/// Hex-encoded request identity, as used for persister keys
#[must_use]
pub fn request_id(method: &str, url: &str, headers: &[(String, String)], body: &[u8]) -> String {
    hex::encode(fingerprint(method, url, headers, body))
}

fn normalize_url(url: &str) -> &str {
    match url.strip_suffix('/') {
        Some(stripped) if !stripped.ends_with(':') && !stripped.ends_with('/') => stripped,
        _ => url,
    }
}
