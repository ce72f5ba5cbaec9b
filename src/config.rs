//! Client configuration

use crate::error::{RegistryError, Result};
use crate::image::reference::Scheme;
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_USER_AGENT: &str = concat!("registry-client/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_MAX_REDIRECTS: usize = 3;

/// Settings shared by every request a [`RegistryClient`](crate::RegistryClient) issues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Overrides the scheme of a non-official index
    pub scheme: Option<Scheme>,
    /// Skip TLS certificate verification
    pub insecure: bool,
    pub user_agent: String,
    /// Actions requested by `login()` when no scope is given
    pub scopes: Vec<String>,
    pub accept_manifest_lists: bool,
    pub accept_oci_manifests: bool,
    pub max_redirects: usize,
    /// Whole-request timeout in seconds, `None` for the transport default
    pub timeout: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            scheme: None,
            insecure: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            scopes: vec!["pull".to_string()],
            accept_manifest_lists: false,
            accept_oci_manifests: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads credentials and TLS settings from `REGISTRY_*` environment variables
    pub fn from_env() -> Self {
        let insecure = env::var("REGISTRY_INSECURE").is_ok_and(|v| v == "true" || v == "1");
        Self {
            username: env::var("REGISTRY_USERNAME").ok(),
            password: env::var("REGISTRY_PASSWORD").ok(),
            insecure,
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = scopes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_accept_manifest_lists(mut self, accept: bool) -> Self {
        self.accept_manifest_lists = accept;
        self
    }

    pub fn with_accept_oci_manifests(mut self, accept: bool) -> Self {
        self.accept_oci_manifests = accept;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.password.is_some() && self.username.is_none() {
            return Err(RegistryError::Validation(
                "Username is required when password is provided".to_string(),
            ));
        }
        if self.max_redirects == 0 {
            return Err(RegistryError::Validation(
                "max_redirects must be greater than 0".to_string(),
            ));
        }
        if self.timeout == Some(0) {
            return Err(RegistryError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        if self.scopes.is_empty() {
            return Err(RegistryError::Validation(
                "At least one scope action is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.scopes, vec!["pull"]);
        assert_eq!(config.max_redirects, 3);
        assert!(config.user_agent.starts_with("registry-client/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_password_without_username() {
        let mut config = ClientConfig::default();
        config.password = Some("secret".to_string());
        assert!(matches!(config.validate(), Err(RegistryError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_zero_redirects() {
        let config = ClientConfig::default().with_max_redirects(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip_keeps_credentials() {
        let config = ClientConfig::default()
            .with_credentials("bob", "hunter2")
            .with_scheme(Scheme::Http);
        let json = serde_json::to_string(&config).unwrap();
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.username.as_deref(), Some("bob"));
        assert_eq!(back.scheme, Some(Scheme::Http));
    }
}
