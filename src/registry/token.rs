//! Bearer token acquisition
//!
//! Exchanges a challenge's `realm`/`service` plus the requested scopes for a
//! token at the authorization server, following the Docker token
//! authentication flow.

use crate::error::handlers::extract_auth_message;
use crate::error::{RegistryError, Result};
use crate::image::Scheme;
use crate::logging::Logger;
use crate::registry::transport::{HttpTransport, RequestSpec};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// Parameters of one token request, taken from a Bearer challenge
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub realm: String,
    pub service: Option<String>,
    pub scopes: Vec<String>,
}

/// Token endpoint reply; only string values count as tokens
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<Value>,
    access_token: Option<Value>,
}

impl TokenResponse {
    fn into_token(self) -> Option<String> {
        let token = self.token.as_ref().and_then(Value::as_str);
        let access_token = self.access_token.as_ref().and_then(Value::as_str);
        token.or(access_token).map(str::to_string)
    }
}

/// `Basic` authorization value for a username/password pair
pub fn basic_auth_value(username: &str, password: &str) -> Result<HeaderValue> {
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    HeaderValue::from_str(&format!("Basic {}", encoded))
        .map_err(|e| RegistryError::Auth(format!("Invalid credentials: {}", e)))
}

#[derive(Clone)]
pub struct TokenFetcher {
    transport: HttpTransport,
    username: Option<String>,
    password: Option<String>,
    /// Scheme used for realms that do not carry one
    scheme: Scheme,
    output: Logger,
}

impl TokenFetcher {
    pub fn new(
        transport: HttpTransport,
        username: Option<String>,
        password: Option<String>,
        scheme: Scheme,
        output: Logger,
    ) -> Self {
        Self {
            transport,
            username,
            password,
            scheme,
            output,
        }
    }

    fn realm_url(&self, realm: &str) -> Result<Url> {
        let realm = realm.trim();
        match realm.split_once("://") {
            Some((scheme, _)) if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") => {
                Ok(Url::parse(realm)?)
            }
            Some((scheme, _)) => Err(RegistryError::Auth(format!(
                "unsupported scheme for token realm \"{}\": {}",
                realm, scheme
            ))),
            None => Ok(Url::parse(&format!("{}://{}", self.scheme, realm))?),
        }
    }

    /// Requests a token; a 401 from the authorization server is an auth failure
    pub async fn get_token(&self, request: &TokenRequest) -> Result<String> {
        let mut url = self.realm_url(&request.realm)?;

        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(service) = &request.service {
            query.push(("service", service.as_str()));
        }
        for scope in &request.scopes {
            query.push(("scope", scope.as_str()));
        }
        if let Some(username) = &self.username {
            query.push(("account", username.as_str()));
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut spec = RequestSpec::new(Method::GET, url).expect(&[200, 401]);
        if let Some(username) = &self.username {
            let password = self.password.as_deref().unwrap_or_default();
            spec = spec.header(AUTHORIZATION, basic_auth_value(username, password)?);
        }

        self.output
            .verbose(&format!("Requesting token for scopes {:?}", request.scopes));
        let response = self.transport.request(spec).await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(RegistryError::Auth(format!(
                "Registry auth failed: {}",
                extract_auth_message(&body)
            )));
        }

        let parsed: TokenResponse = serde_json::from_slice(&body)?;
        match parsed.into_token() {
            Some(token) => {
                self.output.detail("Token obtained");
                Ok(token)
            }
            None => Err(RegistryError::Protocol(
                "authorization server did not include a token".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn fetcher(scheme: Scheme) -> TokenFetcher {
        let output = Logger::new_quiet();
        let transport = HttpTransport::new(&ClientConfig::default(), output.clone()).unwrap();
        TokenFetcher::new(transport, None, None, scheme, output)
    }

    #[test]
    fn test_realm_without_scheme_uses_preference() {
        let url = fetcher(Scheme::Http).realm_url("auth.example.com/token").unwrap();
        assert_eq!(url.as_str(), "http://auth.example.com/token");

        let url = fetcher(Scheme::Https).realm_url("auth.example.com/token").unwrap();
        assert_eq!(url.as_str(), "https://auth.example.com/token");
    }

    #[test]
    fn test_realm_with_scheme_is_kept() {
        let url = fetcher(Scheme::Http)
            .realm_url("https://auth.docker.io/token")
            .unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_realm_with_other_scheme_is_rejected() {
        let err = fetcher(Scheme::Https)
            .realm_url("ftp://auth.example.com/token")
            .unwrap_err();
        assert!(matches!(err, RegistryError::Auth(_)));
    }

    #[test]
    fn test_token_response_accepts_only_strings() {
        let parse = |body: &str| serde_json::from_str::<TokenResponse>(body).unwrap().into_token();
        assert_eq!(parse(r#"{"token":"t","access_token":"a"}"#).as_deref(), Some("t"));
        assert_eq!(parse(r#"{"access_token":"a"}"#).as_deref(), Some("a"));
        assert_eq!(parse(r#"{"token":42,"access_token":"a"}"#).as_deref(), Some("a"));
        assert_eq!(parse(r#"{"token":42}"#), None);
        assert_eq!(parse(r#"{"token":null,"expires_in":300}"#), None);
    }

    #[test]
    fn test_basic_auth_value() {
        let value = basic_auth_value("user", "pass").unwrap();
        assert_eq!(value.to_str().unwrap(), "Basic dXNlcjpwYXNz");
    }
}
