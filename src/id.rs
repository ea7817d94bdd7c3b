//! Session identity generation.
//!
//! IDs are random bytes from the OS-seeded CSPRNG, encoded with the URL-safe
//! base64 alphabet (no padding) and truncated to the configured length. The
//! alphabet contains no `;`, `:`, `=`, `/`, `?` or `#`, so an ID can be
//! embedded in a cookie value or a URL path parameter without escaping.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

/// Generates opaque session identifiers of a fixed length.
pub struct IdGenerator {
    length: usize,
}

impl IdGenerator {
    /// Shortest permitted ID (still 48 bits of entropy).
    pub const MIN_LENGTH: usize = 8;
    /// Longest permitted ID.
    pub const MAX_LENGTH: usize = 64;
    /// Default ID length (~138 bits of entropy).
    pub const DEFAULT_LENGTH: usize = 23;

    /// Creates a generator. Lengths outside `[MIN_LENGTH, MAX_LENGTH]` are clamped.
    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(Self::MIN_LENGTH, Self::MAX_LENGTH),
        }
    }

    /// The length of generated IDs.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Generates a fresh random session ID.
    pub fn generate(&self) -> String {
        // 3 raw bytes yield 4 encoded characters; over-provision and truncate.
        let raw_len = (self.length * 3).div_ceil(4) + 2;
        let mut bytes = vec![0u8; raw_len];
        rand::rng().fill_bytes(&mut bytes);

        let mut encoded = URL_SAFE_NO_PAD.encode(&bytes);
        encoded.truncate(self.length);
        encoded
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length() {
        for len in [8, 16, 23, 64] {
            let r#gen = IdGenerator::new(len);
            assert_eq!(r#gen.generate().len(), len);
        }
    }

    #[test]
    fn clamps_out_of_range_lengths() {
        assert_eq!(IdGenerator::new(0).length(), IdGenerator::MIN_LENGTH);
        assert_eq!(IdGenerator::new(4).length(), IdGenerator::MIN_LENGTH);
        assert_eq!(IdGenerator::new(500).length(), IdGenerator::MAX_LENGTH);
    }

    #[test]
    fn ids_are_cookie_and_path_safe() {
        let r#gen = IdGenerator::default();
        for _ in 0..256 {
            let id = r#gen.generate();
            assert!(
                id.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                "unexpected character in {id}"
            );
        }
    }

    #[test]
    fn ids_do_not_repeat() {
        let r#gen = IdGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(r#gen.generate()));
        }
    }
}
