//! # Credential Provider Module
//!
//! Fornisce la credenziale ambientale usata dal backend nativo.
//! Iniettata come capability così da poterla sostituire nei test.

use std::env;

/// Environment variables checked, in order
pub const CREDENTIAL_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

/// Read-only source of the native backend's API key
pub trait CredentialProvider: Send + Sync {
    /// Returns the key, or `None` when no credential is configured
    fn api_key(&self) -> Option<String>;
}

/// Reads the key from the process environment
#[derive(Debug, Default, Clone)]
pub struct EnvCredentialProvider;

impl CredentialProvider for EnvCredentialProvider {
    fn api_key(&self) -> Option<String> {
        CREDENTIAL_ENV_VARS
            .iter()
            .filter_map(|name| env::var(name).ok())
            .find(|value| !value.trim().is_empty())
    }
}

/// Fixed key, for embedding and tests
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider(Option<String>);

impl StaticCredentialProvider {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Some(key.into()))
    }

    pub fn missing() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn api_key(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider() {
        assert_eq!(StaticCredentialProvider::new("k").api_key().as_deref(), Some("k"));
        assert!(StaticCredentialProvider::missing().api_key().is_none());
    }
}
