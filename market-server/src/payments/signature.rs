//! Deterministic parameter signature
//!
//! The gateway and this service both compute a hash over the request
//! parameters: pairs sorted by field name, concatenated as `key=value`
//! joined by `&`, with the shared passphrase appended when configured,
//! hashed with SHA-256 and hex encoded. The same scheme covers outbound
//! redirect parameters and inbound notification verification.

use sha2::{Digest, Sha256};

/// Compute the signature over a parameter set
pub fn generate(params: &[(String, String)], passphrase: Option<&str>) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut canonical = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    if let Some(passphrase) = passphrase.filter(|p| !p.is_empty()) {
        canonical.push_str("&passphrase=");
        canonical.push_str(passphrase);
    }

    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Check a provided signature against the expected one
pub fn verify(params: &[(String, String)], passphrase: Option<&str>, provided: &str) -> bool {
    generate(params, passphrase) == provided.to_ascii_lowercase()
}
