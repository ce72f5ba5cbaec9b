//! Registry client façade
//!
//! A [`RegistryClient`] is bound to one repository. It owns that repository's
//! authentication session and exposes the registry operations; the resource
//! specific work is done by the operation groups in
//! [`operations`](crate::registry::operations).

use crate::config::ClientConfig;
use crate::error::{RegistryError, Result};
use crate::image::reference::{DEFAULT_V2_REGISTRY, RepositoryRef, parse_repo};
use crate::image::{RepositoryIndex, Scheme};
use crate::logging::Logger;
use crate::registry::auth::{AuthInfo, Authenticator, PingResponse, Session, repository_scope};
use crate::registry::operations::{
    BlobOperations, BlobReader, BlobUpload, GetManifestOptions, ManifestOperations, ManifestResponse,
    PushResponse, RepositoryOperations,
};
use crate::registry::token::TokenFetcher;
use crate::registry::transport::{HttpTransport, ResponseHead};
use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

pub struct RegistryClientBuilder {
    repo: String,
    config: ClientConfig,
    default_index: Option<RepositoryIndex>,
    output: Logger,
}

impl RegistryClientBuilder {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            config: ClientConfig::default(),
            default_index: None,
            output: Logger::default(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config = self.config.with_credentials(username, password);
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.config = self.config.with_insecure(insecure);
        self
    }

    /// Index used for names that do not start with a registry host
    pub fn with_default_index(mut self, index: RepositoryIndex) -> Self {
        self.default_index = Some(index);
        self
    }

    pub fn with_logger(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let repo = parse_repo(&self.repo, self.default_index.as_ref())?;
        RegistryClient::from_repository(repo, self.config, self.output)
    }
}

/// Effective scheme for talking to an index: the one written in the
/// reference, else the configured one, else https
fn index_scheme(index: &RepositoryIndex, config: &ClientConfig) -> Result<Scheme> {
    if index.official {
        if config.scheme == Some(Scheme::Http) {
            return Err(RegistryError::Validation(format!(
                "plain http cannot be used with the official index {}",
                index.name
            )));
        }
        return Ok(Scheme::Https);
    }
    match (index.scheme, config.scheme) {
        (Some(explicit), Some(configured)) if explicit != configured => Err(RegistryError::Validation(format!(
            "index {} is addressed with {} but the client is configured for {}",
            index.name, explicit, configured
        ))),
        (Some(explicit), _) => Ok(explicit),
        (None, configured) => Ok(configured.unwrap_or(Scheme::Https)),
    }
}

/// API base URL of an index
pub fn registry_base_url(index: &RepositoryIndex, config: &ClientConfig) -> Result<Url> {
    let scheme = index_scheme(index, config)?;
    if index.official {
        Ok(Url::parse(DEFAULT_V2_REGISTRY)?)
    } else {
        Ok(Url::parse(&format!("{}://{}", scheme, index.name))?)
    }
}

pub struct RegistryClient {
    repo: RepositoryRef,
    config: ClientConfig,
    auth: Arc<Authenticator>,
    manifests: ManifestOperations,
    blobs: BlobOperations,
    repository: RepositoryOperations,
    output: Logger,
}

impl RegistryClient {
    /// Client for `repo` (`[scheme://][index/]name`) with the given config
    pub fn new(repo: &str, config: ClientConfig) -> Result<Self> {
        Self::builder(repo).with_config(config).build()
    }

    pub fn builder(repo: impl Into<String>) -> RegistryClientBuilder {
        RegistryClientBuilder::new(repo)
    }

    /// Client for an already parsed repository
    pub fn from_repository(repo: RepositoryRef, config: ClientConfig, output: Logger) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config, output.clone())?;
        let base_url = registry_base_url(&repo.index, &config)?;
        let tokens = TokenFetcher::new(
            transport.clone(),
            config.username.clone(),
            config.password.clone(),
            index_scheme(&repo.index, &config)?,
            output.clone(),
        );
        let auth = Arc::new(Authenticator::new(
            transport.clone(),
            tokens,
            base_url,
            repo.remote_name.clone(),
            config.username.clone(),
            config.password.clone(),
            output.clone(),
        )
        .with_default_actions(&config.scopes));

        let manifests = ManifestOperations::new(
            transport.clone(),
            Arc::clone(&auth),
            output.clone(),
            config.max_redirects,
        )
        .with_accept_defaults(config.accept_manifest_lists, config.accept_oci_manifests);
        let blobs = BlobOperations::new(
            transport.clone(),
            Arc::clone(&auth),
            output.clone(),
            config.max_redirects,
        );
        let repository = RepositoryOperations::new(transport, Arc::clone(&auth), output.clone(), config.max_redirects);

        output.detail(&format!("Registry client for {} at {}", repo.canonical_name, auth.base_url()));

        Ok(Self {
            repo,
            config,
            auth,
            manifests,
            blobs,
            repository,
            output,
        })
    }

    pub fn repo(&self) -> &RepositoryRef {
        &self.repo
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        self.auth.base_url()
    }

    /// Snapshot of the authentication session
    pub async fn session(&self) -> Session {
        self.auth.session().await
    }

    /// GET `/v2/` with a short connect timeout; 200, 401 and 404 are all answers
    pub async fn ping(&self) -> Result<PingResponse> {
        self.auth.ping().await
    }

    /// Whether the registry speaks the v2 API; unreachable registries report `false`
    pub async fn supports_v2(&self) -> Result<bool> {
        match self.ping().await {
            Ok(ping) => Ok(ping.supports_v2()),
            Err(e) if e.is_transport() => {
                self.output
                    .warning(&format!("Registry {} is unreachable: {}", self.base_url(), e));
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Log in with the configured default actions, the scope every read uses
    pub async fn login(&self) -> Result<HeaderMap> {
        self.auth.login_default().await
    }

    pub async fn login_with_actions(&self, actions: &[&str]) -> Result<HeaderMap> {
        self.login_scope(&repository_scope(&self.repo.remote_name, actions))
            .await
    }

    /// Log in for an explicit scope string; repeated calls with the same scope are free
    pub async fn login_scope(&self, scope: &str) -> Result<HeaderMap> {
        self.auth.login(scope).await
    }

    /// Negotiate credentials for `scope` without updating the session
    pub async fn perform_login(&self, scope: &str, ping: Option<&PingResponse>) -> Result<AuthInfo> {
        self.auth.perform_login(scope, ping).await
    }

    pub async fn list_tags(&self) -> Result<Value> {
        self.repository.list_tags().await
    }

    pub async fn get_manifest(&self, options: &GetManifestOptions) -> Result<ManifestResponse> {
        self.manifests.get_manifest(options).await
    }

    pub async fn put_manifest(
        &self,
        manifest_data: impl Into<Bytes>,
        reference: &str,
        media_type: Option<&str>,
    ) -> Result<PushResponse> {
        self.manifests
            .put_manifest(manifest_data, reference, media_type)
            .await
    }

    pub async fn delete_manifest(&self, reference: &str) -> Result<HeaderMap> {
        self.manifests.delete_manifest(reference).await
    }

    pub async fn head_blob(&self, digest: &str) -> Result<Vec<ResponseHead>> {
        self.blobs.head_blob(digest).await
    }

    pub async fn create_blob_read_stream(&self, digest: &str) -> Result<BlobReader> {
        self.blobs.create_blob_read_stream(digest).await
    }

    pub async fn blob_upload(&self, upload: BlobUpload) -> Result<PushResponse> {
        self.blobs.blob_upload(upload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::parse_index;

    #[test]
    fn test_official_index_base_url() {
        let index = parse_index(None).unwrap();
        let url = registry_base_url(&index, &ClientConfig::default()).unwrap();
        assert_eq!(url.as_str(), "https://registry-1.docker.io/");
    }

    #[test]
    fn test_private_index_base_url() {
        let index = parse_index(Some("http://localhost:5000")).unwrap();
        let url = registry_base_url(&index, &ClientConfig::default()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/");

        let index = parse_index(Some("registry.example.com")).unwrap();
        let config = ClientConfig::default().with_scheme(Scheme::Http);
        let url = registry_base_url(&index, &config).unwrap();
        assert_eq!(url.as_str(), "http://registry.example.com/");
    }

    #[test]
    fn test_explicit_scheme_wins_over_config() {
        let index = parse_index(Some("http://localhost:5000")).unwrap();
        let config = ClientConfig::default().with_scheme(Scheme::Http);
        let url = registry_base_url(&index, &config).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/");

        let config = ClientConfig::default().with_scheme(Scheme::Https);
        let err = registry_base_url(&index, &config).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert!(RegistryClient::new("http://localhost:5000/team/app", config).is_err());
    }

    #[test]
    fn test_official_index_rejects_http_config() {
        let index = parse_index(None).unwrap();
        let config = ClientConfig::default().with_scheme(Scheme::Http);
        assert!(matches!(
            registry_base_url(&index, &config),
            Err(RegistryError::Validation(_))
        ));
        assert!(RegistryClient::new("busybox", config).is_err());

        let config = ClientConfig::default().with_scheme(Scheme::Https);
        let url = registry_base_url(&index, &config).unwrap();
        assert_eq!(url.as_str(), "https://registry-1.docker.io/");
    }

    #[test]
    fn test_read_scope_follows_configured_actions() {
        let client = RegistryClient::new("localhost:5000/team/app", ClientConfig::default()).unwrap();
        assert_eq!(client.auth.default_scope(), "repository:team/app:pull");

        let config = ClientConfig::default().with_scopes(&["pull", "push"]);
        let client = RegistryClient::new("localhost:5000/team/app", config).unwrap();
        assert_eq!(client.auth.default_scope(), "repository:team/app:pull,push");
    }

    #[test]
    fn test_builder_parses_repo() {
        let client = RegistryClient::builder("busybox").build().unwrap();
        assert_eq!(client.repo().remote_name, "library/busybox");
        assert_eq!(client.base_url().as_str(), "https://registry-1.docker.io/");

        let client = RegistryClient::new("localhost:5000/team/app", ClientConfig::default()).unwrap();
        assert_eq!(client.repo().remote_name, "team/app");
        assert_eq!(client.base_url().as_str(), "https://localhost:5000/");
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        let mut config = ClientConfig::default();
        config.password = Some("secret".to_string());
        assert!(RegistryClient::new("busybox", config).is_err());
    }
}
