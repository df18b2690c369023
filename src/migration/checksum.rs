//! Checksums recorded next to each applied migration

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a migration script.
pub fn calculate_checksum(script: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(script.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable_hex() {
        let sum = calculate_checksum("CREATE TABLE donors ()");
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sum, calculate_checksum("CREATE TABLE donors ()"));
        assert_ne!(sum, calculate_checksum("CREATE TABLE donors ( )"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            calculate_checksum(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
