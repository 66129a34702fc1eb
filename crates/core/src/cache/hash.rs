//! Request identity used as the entry key inside a partition.

use sha2::{Digest, Sha256};
use url::Url;

/// Compute the cache key for a request: method and URL, fragment removed.
pub fn compute_cache_key(method: &str, url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("GET", &url("https://example.com/fights"));
        let hash2 = compute_cache_key("get", &url("https://example.com/fights"));
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_ignores_fragment() {
        let plain = compute_cache_key("GET", &url("https://example.com/about"));
        let fragment = compute_cache_key("GET", &url("https://example.com/about#record"));
        assert_eq!(plain, fragment);
    }

    #[test]
    fn test_hash_keeps_query() {
        let a = compute_cache_key("GET", &url("https://example.com/api/fights?page=1"));
        let b = compute_cache_key("GET", &url("https://example.com/api/fights?page=2"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_cache_key("GET", &url("https://example.com/api/contact"));
        let head = compute_cache_key("HEAD", &url("https://example.com/api/contact"));
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("GET", &url("https://example.com"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
