use sha2::{Digest, Sha256};

/// SHA-256 of an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Lowercase hex encoding of a 32-byte digest (64 chars).
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Short digest used to correlate the log lines of one request.
pub fn image_digest(data: &[u8]) -> String {
    let mut hex = to_hex(&sha256_bytes(data));
    hex.truncate(16);
    hex
}
