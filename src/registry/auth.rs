//! Authentication negotiation for one repository
//!
//! The registry is pinged at `/v2/`; a 200 means no credentials are needed,
//! a 401 carries a `WWW-Authenticate` challenge that selects Basic or Bearer
//! auth. The resulting authorization header is kept in a per-client
//! [`Session`] and reused for as long as the requested scope does not change.

use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::challenge::parse_challenge;
use crate::registry::token::{TokenFetcher, TokenRequest, basic_auth_value};
use crate::registry::transport::{HttpTransport, RequestSpec};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};
use tokio::sync::Mutex;
use url::Url;

/// Header advertising registry API support
pub const API_VERSION_HEADER: &str = "docker-distribution-api-version";

/// Credentials to present to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthInfo {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl AuthInfo {
    /// Value for the `Authorization` header, `None` for anonymous access
    pub fn header_value(&self) -> Result<Option<HeaderValue>> {
        match self {
            AuthInfo::None => Ok(None),
            AuthInfo::Basic { username, password } => basic_auth_value(username, password).map(Some),
            AuthInfo::Bearer { token } => HeaderValue::from_str(&format!("Bearer {}", token))
                .map(Some)
                .map_err(|e| RegistryError::Auth(format!("Invalid bearer token: {}", e))),
        }
    }
}

/// Status and headers of a `/v2/` probe
#[derive(Debug, Clone)]
pub struct PingResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl PingResponse {
    pub fn challenge(&self) -> Option<&str> {
        self.headers
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
    }

    /// True when the registry declares `registry/2.0` or answered 200/401
    pub fn supports_v2(&self) -> bool {
        let declared = self
            .headers
            .get(API_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "registry/2.0");
        declared || self.status == StatusCode::OK || self.status == StatusCode::UNAUTHORIZED
    }
}

/// Authorization state of one client
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub logged_in: bool,
    pub logged_in_scope: Option<String>,
    pub auth_info: Option<AuthInfo>,
    /// Headers sent with every registry request
    pub headers: HeaderMap,
}

impl Session {
    fn is_valid_for(&self, scope: &str) -> bool {
        self.logged_in && self.logged_in_scope.as_deref() == Some(scope)
    }

    fn apply(&mut self, scope: &str, auth_info: AuthInfo) -> Result<()> {
        self.headers.remove(AUTHORIZATION);
        if let Some(value) = auth_info.header_value()? {
            self.headers.insert(AUTHORIZATION, value);
        }
        self.auth_info = Some(auth_info);
        self.logged_in_scope = Some(scope.to_string());
        self.logged_in = true;
        Ok(())
    }
}

/// `repository:<name>:<actions>` scope string
pub fn repository_scope(remote_name: &str, actions: &[&str]) -> String {
    format!("repository:{}:{}", remote_name, actions.join(","))
}

/// Runs the ping/challenge/credential exchange and owns the session
pub struct Authenticator {
    transport: HttpTransport,
    tokens: TokenFetcher,
    base_url: Url,
    remote_name: String,
    username: Option<String>,
    password: Option<String>,
    /// Actions requested by reads and by a plain `login()`
    default_actions: Vec<String>,
    session: Mutex<Session>,
    output: Logger,
}

impl Authenticator {
    pub fn new(
        transport: HttpTransport,
        tokens: TokenFetcher,
        base_url: Url,
        remote_name: String,
        username: Option<String>,
        password: Option<String>,
        output: Logger,
    ) -> Self {
        Self {
            transport,
            tokens,
            base_url,
            remote_name,
            username,
            password,
            default_actions: vec!["pull".to_string()],
            session: Mutex::new(Session::default()),
            output,
        }
    }

    pub fn with_default_actions(mut self, actions: &[String]) -> Self {
        if !actions.is_empty() {
            self.default_actions = actions.to_vec();
        }
        self
    }

    /// Scope requested for the configured default actions
    pub fn default_scope(&self) -> String {
        let actions: Vec<&str> = self.default_actions.iter().map(String::as_str).collect();
        repository_scope(&self.remote_name, &actions)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    /// Copy of the current session state
    pub async fn session(&self) -> Session {
        self.session.lock().await.clone()
    }

    fn v2_url(&self) -> Result<Url> {
        Ok(self.base_url.join("v2/")?)
    }

    async fn ping_expecting(&self, expect: &[u16]) -> Result<PingResponse> {
        let request = RequestSpec::new(Method::GET, self.v2_url()?)
            .expect(expect)
            .probe();
        let response = self.transport.request(request).await?;
        Ok(PingResponse {
            status: response.status(),
            headers: response.headers().clone(),
        })
    }

    /// Probes `/v2/`, accepting 200, 401 and 404
    pub async fn ping(&self) -> Result<PingResponse> {
        self.ping_expecting(&[200, 401, 404]).await
    }

    /// Works out the credentials for `scope` without touching the session.
    /// A previous ping is reused when it already tells us what to do.
    pub async fn perform_login(&self, scope: &str, ping: Option<&PingResponse>) -> Result<AuthInfo> {
        let fresh;
        let ping = match ping {
            Some(p) if p.status == StatusCode::OK || p.challenge().is_some() => p,
            _ => {
                fresh = self.ping_expecting(&[200, 401]).await?;
                &fresh
            }
        };

        if ping.status == StatusCode::OK {
            self.output.detail("Registry allows anonymous access");
            return Ok(AuthInfo::None);
        }

        let header = ping.challenge().ok_or_else(|| {
            RegistryError::Auth(format!(
                "registry at {} answered {} without a WWW-Authenticate challenge",
                self.base_url, ping.status
            ))
        })?;
        let challenge = parse_challenge(header)?;
        self.output
            .detail(&format!("Auth challenge: {} {:?}", challenge.scheme, challenge.params));

        if challenge.is_scheme("basic") {
            Ok(AuthInfo::Basic {
                username: self.username.clone().unwrap_or_default(),
                password: self.password.clone().unwrap_or_default(),
            })
        } else if challenge.is_scheme("bearer") {
            let realm = challenge
                .param("realm")
                .ok_or_else(|| RegistryError::Auth("Bearer challenge has no realm".to_string()))?;
            let request = TokenRequest {
                realm: realm.to_string(),
                service: challenge.param("service").map(str::to_string),
                scopes: vec![scope.to_string()],
            };
            let token = self.tokens.get_token(&request).await?;
            Ok(AuthInfo::Bearer { token })
        } else {
            Err(RegistryError::Unsupported(format!(
                "unsupported auth scheme: \"{}\"",
                challenge.scheme
            )))
        }
    }

    /// Authenticates for `scope` unless already logged in with exactly that
    /// scope, and returns the headers to send with registry requests.
    pub async fn login(&self, scope: &str) -> Result<HeaderMap> {
        let mut session = self.session.lock().await;
        if session.is_valid_for(scope) {
            return Ok(session.headers.clone());
        }

        self.output.verbose(&format!("Logging in with scope {}", scope));
        let auth_info = self.perform_login(scope, None).await?;
        session.apply(scope, auth_info)?;
        Ok(session.headers.clone())
    }

    /// Logs in for the given actions on this repository
    pub async fn login_for(&self, actions: &[&str]) -> Result<HeaderMap> {
        self.login(&repository_scope(&self.remote_name, actions)).await
    }

    /// Logs in with the default actions, as every read does
    pub async fn login_default(&self) -> Result<HeaderMap> {
        self.login(&self.default_scope()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_scope() {
        assert_eq!(repository_scope("library/busybox", &["pull"]), "repository:library/busybox:pull");
        assert_eq!(
            repository_scope("library/busybox", &["pull", "push"]),
            "repository:library/busybox:pull,push"
        );
    }

    #[test]
    fn test_auth_info_header_value() {
        assert_eq!(AuthInfo::None.header_value().unwrap(), None);
        let bearer = AuthInfo::Bearer {
            token: "abc".to_string(),
        };
        assert_eq!(bearer.header_value().unwrap().unwrap(), "Bearer abc");
        let basic = AuthInfo::Basic {
            username: String::new(),
            password: String::new(),
        };
        assert_eq!(basic.header_value().unwrap().unwrap(), "Basic Og==");
    }

    #[test]
    fn test_ping_supports_v2() {
        let mut headers = HeaderMap::new();
        let ping = PingResponse {
            status: StatusCode::NOT_FOUND,
            headers: headers.clone(),
        };
        assert!(!ping.supports_v2());

        headers.insert(API_VERSION_HEADER, HeaderValue::from_static("registry/2.0"));
        let ping = PingResponse {
            status: StatusCode::NOT_FOUND,
            headers,
        };
        assert!(ping.supports_v2());

        let ping = PingResponse {
            status: StatusCode::UNAUTHORIZED,
            headers: HeaderMap::new(),
        };
        assert!(ping.supports_v2());
    }

    #[test]
    fn test_session_scope_replacement() {
        let mut session = Session::default();
        assert!(!session.is_valid_for("repository:a:pull"));

        session
            .apply(
                "repository:a:pull",
                AuthInfo::Bearer {
                    token: "t1".to_string(),
                },
            )
            .unwrap();
        assert!(session.is_valid_for("repository:a:pull"));
        assert!(!session.is_valid_for("repository:a:pull,push"));

        session.apply("repository:a:pull,push", AuthInfo::None).unwrap();
        assert!(session.headers.get(AUTHORIZATION).is_none());
        assert_eq!(session.auth_info, Some(AuthInfo::None));
    }
}
