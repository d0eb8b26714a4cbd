//! Lookup key normalization.

/// Canonicalizes names and emails before they are stored or looked up, so
/// lookups are case-insensitive.
pub trait LookupNormalizer: Send + Sync {
    fn normalize_name(&self, name: &str) -> String;

    fn normalize_email(&self, email: &str) -> String;
}

/// Trims and upper-cases keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpperInvariantNormalizer;

impl LookupNormalizer for UpperInvariantNormalizer {
    fn normalize_name(&self, name: &str) -> String {
        name.trim().to_uppercase()
    }

    fn normalize_email(&self, email: &str) -> String {
        self.normalize_name(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upper_invariant() {
        let normalizer = UpperInvariantNormalizer;

        assert_eq!(normalizer.normalize_email(" a@X.com "), "A@X.COM");
        assert_eq!(normalizer.normalize_name("jürgen"), "JÜRGEN");
    }
}
