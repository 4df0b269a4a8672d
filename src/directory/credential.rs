use sha2::{Digest, Sha256};

/// Hash a device credential for storage (SHA-256, hex-encoded)
pub fn hash_credential(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    hex::encode(digest)
}

/// Verify a presented credential against a stored hash
pub fn verify_credential(credential: &str, stored_hash: &str) -> bool {
    // Constant-time comparison over the hex digests
    let candidate = hash_credential(credential);
    if candidate.len() != stored_hash.len() {
        return false;
    }
    candidate
        .bytes()
        .zip(stored_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
