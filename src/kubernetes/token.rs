//! Cluster join token

use rand::RngCore;

/// Static token used when reproducible output is preferred over secrecy.
pub const PLACEHOLDER_TOKEN: &str = "edge-cluster-token";

/// How a missing cluster token is filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenPolicy {
    /// 32 random bytes, hex encoded.
    #[default]
    Random,
    Placeholder,
}

impl TokenPolicy {
    pub fn token(&self) -> String {
        match self {
            TokenPolicy::Random => generate_cluster_token(),
            TokenPolicy::Placeholder => PLACEHOLDER_TOKEN.to_string(),
        }
    }
}

/// Generate a random hex token (64 characters = 32 bytes)
pub fn generate_cluster_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);

    let mut token = String::with_capacity(64);
    for byte in bytes {
        token.push_str(&format!("{:02x}", byte));
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_shape() {
        let token = generate_cluster_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_cluster_token());
    }

    #[test]
    fn test_placeholder_policy() {
        assert_eq!(TokenPolicy::Placeholder.token(), PLACEHOLDER_TOKEN);
    }
}
