//! API key and code minting.
//!
//! Keys are `solskill_` followed by 24 random bytes hex-encoded (48 chars).
//! They are generated once at registration and never regenerable: a lost key
//! orphans its agent by design.

use rand::RngCore;

use crate::store::agents::API_KEY_PREFIX;

const API_KEY_BYTES: usize = 24;

pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{API_KEY_PREFIX}{}", hex_encode(&bytes))
}

/// Public, shareable claim code (8 bytes hex).
pub fn generate_claim_code() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

/// Short random string that must appear verbatim in the claim tweet.
pub fn generate_verification_code() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("SKILL-{}", hex_encode(&bytes).to_uppercase())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_shape() {
        let key = generate_api_key();
        assert!(key.starts_with("solskill_"));
        let hex = &key["solskill_".len()..];
        assert_eq!(hex.len(), 48);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn keys_are_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a, b);
    }

    #[test]
    fn verification_code_has_prefix() {
        let code = generate_verification_code();
        assert!(code.starts_with("SKILL-"));
        assert_eq!(code.len(), "SKILL-".len() + 8);
    }
}
