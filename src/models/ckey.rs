// src/models/ckey.rs

//! Canonical key normalization.
//!
//! Upstreams report player and moderator identifiers in whatever form the
//! game client produced ("Alice B.", "alice_b"). The store only ever holds
//! the canonical form: lowercased with every character outside `[a-z0-9]`
//! removed.

/// Canonicalize a raw key.
pub fn canonical_key(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Canonicalize an optional raw key, mapping empty results to `None`.
pub fn canonical_key_opt(raw: Option<&str>) -> Option<String> {
    raw.map(canonical_key).filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_strips() {
        assert_eq!(canonical_key("Alice"), "alice");
        assert_eq!(canonical_key("Alice B."), "aliceb");
        assert_eq!(canonical_key("mod_1"), "mod1");
        assert_eq!(canonical_key("  Spaced Out  "), "spacedout");
    }

    #[test]
    fn test_non_ascii_is_removed() {
        assert_eq!(canonical_key("Héllo99"), "hllo99");
    }

    #[test]
    fn test_fixed_point() {
        for raw in ["Alice B.", "already", "MOD_1", "héllo"] {
            let once = canonical_key(raw);
            assert_eq!(canonical_key(&once), once);
        }
    }

    #[test]
    fn test_optional_form() {
        assert_eq!(canonical_key_opt(Some("Mod1")), Some("mod1".to_string()));
        assert_eq!(canonical_key_opt(Some("___")), None);
        assert_eq!(canonical_key_opt(None), None);
    }
}
