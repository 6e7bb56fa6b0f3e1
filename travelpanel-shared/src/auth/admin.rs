/// Platform admin credential
///
/// Platform admins (the people approving access requests) are not agency
/// users. They authenticate with a shared key sent in `X-Admin-Key`; only
/// its SHA-256 digest is kept in memory and candidates are compared in
/// constant time.
///
/// # Example
///
/// ```
/// use travelpanel_shared::auth::admin::AdminKey;
///
/// let key = AdminKey::new("a-platform-admin-key-of-32-bytes-or-more");
/// assert!(key.verify("a-platform-admin-key-of-32-bytes-or-more"));
/// assert!(!key.verify("guess"));
/// ```

use sha2::{Digest, Sha256};
use std::fmt;

/// Actor recorded when the caller does not name one
pub const DEFAULT_ACTOR: &str = "platform-admin";

const MAX_ACTOR_LEN: usize = 255;

/// Hashed admin key
#[derive(Clone)]
pub struct AdminKey {
    digest: String,
}

impl AdminKey {
    pub fn new(plaintext: &str) -> Self {
        Self {
            digest: sha256_hex(plaintext),
        }
    }

    /// Checks a presented key
    pub fn verify(&self, candidate: &str) -> bool {
        constant_time_compare(&sha256_hex(candidate), &self.digest)
    }
}

impl fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminKey(<redacted>)")
    }
}

fn sha256_hex(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Compares two strings without short-circuiting on the first difference
///
/// Lengths are not secret here: both sides are fixed-length digests.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Cleans the actor name recorded on approve/reject/cancel
pub fn normalize_actor(actor: Option<&str>) -> String {
    actor
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| a.chars().take(MAX_ACTOR_LEN).collect())
        .unwrap_or_else(|| DEFAULT_ACTOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify() {
        let key = AdminKey::new("correct-horse-battery-staple-0123456789");
        assert!(key.verify("correct-horse-battery-staple-0123456789"));
        assert!(!key.verify("correct-horse-battery-staple-012345678"));
        assert!(!key.verify(""));
    }

    #[test]
    fn test_debug_does_not_leak() {
        let key = AdminKey::new("secret-admin-key");
        let shown = format!("{:?}", key);
        assert!(!shown.contains("secret"));
        assert!(!shown.contains(&sha256_hex("secret-admin-key")));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_normalize_actor() {
        assert_eq!(normalize_actor(None), "platform-admin");
        assert_eq!(normalize_actor(Some("   ")), "platform-admin");
        assert_eq!(normalize_actor(Some(" ops@travelpanel.io ")), "ops@travelpanel.io");
        assert_eq!(normalize_actor(Some(&"x".repeat(300))).len(), 255);
    }
}
