use sha2::{Digest, Sha256};

/// SHA-256 of the UTF-8 bytes of `content`, as lowercase hex.
pub fn hash_sha256(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
