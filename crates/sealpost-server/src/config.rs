//! Configuration resolution.
//!
//! Key material reaches the service through a secrets provider, never
//! through request payloads. Logical names are resolved once per request,
//! so rotated values take effect without a restart; the cryptographic core
//! only ever sees the resolved arguments.

use std::collections::HashMap;

/// Base64-encoded recipient public key (required).
pub const PUBLIC_KEY: &str = "pgp-public-key";

/// Base64-encoded signing secret key (required).
pub const PRIVATE_KEY_SIGN: &str = "pgp-private-key-sign";

/// Passphrase unlocking the signing key (optional, defaults to unset).
pub const PASSPHRASE_SIGN: &str = "pgp-passphrase-sign";

/// Deployment function key gating the endpoint (optional; absent means
/// the gate is open, for development).
pub const FUNCTION_KEY: &str = "function-key";

/// Source of configuration values by logical name.
///
/// Implementations must treat empty values as absent: an empty environment
/// variable carries no key material.
pub trait SecretsProvider: Send + Sync {
    /// Resolve a logical name to its current value.
    fn get(&self, name: &str) -> Option<String>;
}

/// Production provider backed by process environment variables.
///
/// Logical names map to environment variables by uppercasing and replacing
/// `-` with `_`: `pgp-public-key` reads `PGP_PUBLIC_KEY`.
#[derive(Clone, Default)]
pub struct EnvSecrets;

impl EnvSecrets {
    /// Create an environment-backed provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Environment variable name for a logical configuration name.
    pub fn env_name(name: &str) -> String {
        name.to_ascii_uppercase().replace('-', "_")
    }
}

impl SecretsProvider for EnvSecrets {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(Self::env_name(name)).ok().filter(|value| !value.trim().is_empty())
    }
}

/// Map-backed provider for tests and embedding.
#[derive(Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    /// Empty provider (every lookup misses).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under a logical name.
    #[must_use]
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

impl SecretsProvider for StaticSecrets {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned().filter(|value| !value.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_name_mapping() {
        assert_eq!(EnvSecrets::env_name(PUBLIC_KEY), "PGP_PUBLIC_KEY");
        assert_eq!(EnvSecrets::env_name(PRIVATE_KEY_SIGN), "PGP_PRIVATE_KEY_SIGN");
        assert_eq!(EnvSecrets::env_name(PASSPHRASE_SIGN), "PGP_PASSPHRASE_SIGN");
        assert_eq!(EnvSecrets::env_name(FUNCTION_KEY), "FUNCTION_KEY");
    }

    #[test]
    fn static_provider_resolves() {
        let provider = StaticSecrets::new().with(PUBLIC_KEY, "dGVzdA==");
        assert_eq!(provider.get(PUBLIC_KEY).as_deref(), Some("dGVzdA=="));
        assert_eq!(provider.get(PRIVATE_KEY_SIGN), None);
    }

    #[test]
    fn empty_values_are_absent() {
        let provider = StaticSecrets::new().with(PUBLIC_KEY, "   ");
        assert_eq!(provider.get(PUBLIC_KEY), None);
    }
}
