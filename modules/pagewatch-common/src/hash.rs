use sha2::{Digest, Sha256};

/// SHA-256 hex digest of normalized content.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Stable filesystem-safe key for a URL.
pub fn url_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.trim().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_hex_sha256() {
        let h = content_hash("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn url_key_ignores_surrounding_whitespace() {
        assert_eq!(url_key(" https://example.se/ "), url_key("https://example.se/"));
        assert_ne!(url_key("https://a.se"), url_key("https://b.se"));
    }
}
