use sha2::{Digest, Sha256};

use crate::types::Proposition;

/// Trim and collapse every whitespace run to a single space.
pub fn normalize_claim_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 16 hex characters of SHA-256 over the case-folded normalized text.
pub fn signature_for_text(text: &str) -> String {
    let normalized = normalize_claim_text(text).to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Fill in `canonical_text` and `claim_signature` for each proposition.
pub fn canonicalize_propositions(mut propositions: Vec<Proposition>) -> Vec<Proposition> {
    for prop in propositions.iter_mut() {
        let canonical = normalize_claim_text(&prop.payload.claim_text);
        prop.payload.claim_signature = Some(signature_for_text(&canonical));
        prop.payload.canonical_text = Some(canonical);
    }
    propositions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["  Water   boils\tat\n100 C ", "", "   ", "single", "a  b  c"] {
            let once = normalize_claim_text(raw);
            assert_eq!(normalize_claim_text(&once), once);
        }
        assert_eq!(normalize_claim_text("  Water   boils\tat\n100 C "), "Water boils at 100 C");
    }

    #[test]
    fn test_signature_ignores_case_and_spacing() {
        let a = signature_for_text("Water boils at 100 C");
        let b = signature_for_text("  water BOILS   at\n100 c  ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, signature_for_text("Water boils at 100 F"));
    }

    #[test]
    fn test_signature_of_empty_text_is_stable() {
        // sha256("") = e3b0c442...
        assert_eq!(signature_for_text("   "), "e3b0c44298fc1c14");
    }
}
