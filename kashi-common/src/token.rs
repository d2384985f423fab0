//! Per-request resource tokens

use std::fmt;
use uuid::Uuid;

/// Unique identifier used to namespace a request's temporary artifacts
///
/// Backed by a random UUIDv4, so concurrently generated tokens never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceToken(Uuid);

impl ResourceToken {
    /// Generate a fresh token
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ResourceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_tokens_are_distinct() {
        let tokens: HashSet<ResourceToken> = (0..1000).map(|_| ResourceToken::generate()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_display_is_hyphenated_v4() {
        let text = ResourceToken::generate().to_string();
        assert_eq!(text.len(), 36);
        let uuid = Uuid::parse_str(&text).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
    }
}
