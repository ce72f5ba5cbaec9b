//! HTTP request execution and redirect following
//!
//! [`HttpTransport::request`] issues exactly one request (the underlying
//! client never follows redirects on its own) and turns any status outside
//! the expected set into a structured error. [`HttpTransport::follow_redirects`]
//! layers a bounded 302/307 loop on top of it and keeps every response head so
//! callers can look at headers from the origin as well as the final hop.

use crate::config::ClientConfig;
use crate::error::handlers::HttpErrorHandler;
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, LOCATION, USER_AGENT};
use reqwest::{Client, Method, StatusCode, redirect};
use std::time::Duration;
use url::Url;

/// Connect timeout for capability probes
pub const PING_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const REDIRECT_STATUSES: [u16; 2] = [302, 307];

/// One request to issue
pub struct RequestSpec {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<reqwest::Body>,
    /// Acceptable status codes
    pub expect: Vec<u16>,
    /// Use the fast-failing probe client
    pub probe: bool,
}

impl RequestSpec {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            expect: vec![200],
            probe: false,
        }
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<reqwest::Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn expect(mut self, statuses: &[u16]) -> Self {
        self.expect = statuses.to_vec();
        self
    }

    pub fn probe(mut self) -> Self {
        self.probe = true;
        self
    }
}

/// A request sequence that may be redirected
pub struct RedirectSpec {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Statuses accepted in addition to 200, 302 and 307
    pub extra_expect: Vec<u16>,
    pub follow: bool,
    /// Upper bound on the number of requests issued
    pub max_redirects: usize,
}

impl RedirectSpec {
    pub fn new(method: Method, url: Url, headers: HeaderMap, max_redirects: usize) -> Self {
        Self {
            method,
            url,
            headers,
            extra_expect: Vec::new(),
            follow: true,
            max_redirects,
        }
    }

    pub fn also_expect(mut self, statuses: &[u16]) -> Self {
        self.extra_expect.extend_from_slice(statuses);
        self
    }

    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }
}

/// Status line and headers of a response whose body is not needed
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn of(response: &reqwest::Response) -> Self {
        Self {
            url: response.url().clone(),
            status: response.status(),
            headers: response.headers().clone(),
        }
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Responses produced while following redirects for one logical operation
pub struct ResponseChain {
    heads: Vec<ResponseHead>,
    terminal: reqwest::Response,
}

impl ResponseChain {
    /// Every response in order; the last one is the terminal response
    pub fn heads(&self) -> &[ResponseHead] {
        &self.heads
    }

    /// The origin server's response
    pub fn first(&self) -> &ResponseHead {
        &self.heads[0]
    }

    pub fn last(&self) -> &ResponseHead {
        &self.heads[self.heads.len() - 1]
    }

    pub fn into_parts(self) -> (Vec<ResponseHead>, reqwest::Response) {
        (self.heads, self.terminal)
    }
}

/// Single-request executor shared by all registry operations
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    probe_client: Client,
    user_agent: HeaderValue,
    output: Logger,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, output: Logger) -> Result<Self> {
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| RegistryError::Validation(format!("Invalid user agent: {}", e)))?;

        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(config.insecure);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let client = builder.build()?;

        let probe_client = Client::builder()
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(config.insecure)
            .connect_timeout(PING_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            probe_client,
            user_agent,
            output,
        })
    }

    /// Issues one request and checks its status against `spec.expect`
    pub async fn request(&self, spec: RequestSpec) -> Result<reqwest::Response> {
        let RequestSpec {
            method,
            url,
            mut headers,
            body,
            expect,
            probe,
        } = spec;

        headers.insert(USER_AGENT, self.user_agent.clone());
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }

        self.output.trace(&format!("{} {}", method, url));

        let client = if probe { &self.probe_client } else { &self.client };
        let mut builder = client.request(method.clone(), url.clone()).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        self.output.detail(&format!("{} {} -> {}", method, url, status));

        if expect.contains(&status.as_u16()) {
            Ok(response)
        } else {
            Err(HttpErrorHandler::from_response(response).await)
        }
    }

    /// Follows up to `max_redirects` hops of 302/307, keeping each response head.
    /// Headers are only sent to the first URL.
    pub async fn follow_redirects(&self, spec: RedirectSpec) -> Result<ResponseChain> {
        let mut expect = vec![200, 302, 307];
        for status in spec.extra_expect {
            if !expect.contains(&status) {
                expect.push(status);
            }
        }

        let mut url = spec.url;
        let mut headers = spec.headers;
        let mut heads = Vec::new();

        loop {
            if heads.len() >= spec.max_redirects {
                return Err(RegistryError::TooManyRedirects {
                    max: spec.max_redirects,
                    url: url.to_string(),
                });
            }

            let response = self
                .request(
                    RequestSpec::new(spec.method.clone(), url.clone())
                        .headers(std::mem::take(&mut headers))
                        .expect(&expect),
                )
                .await?;
            let head = ResponseHead::of(&response);

            let location = if spec.follow && REDIRECT_STATUSES.contains(&head.status.as_u16()) {
                head.header_str(LOCATION.as_str()).map(str::to_string)
            } else {
                None
            };
            heads.push(head);

            match location {
                Some(location) => {
                    // relative locations resolve against the URL just requested
                    url = url.join(&location)?;
                    self.output.detail(&format!("Redirected to {}", url));
                }
                None => {
                    return Ok(ResponseChain {
                        heads,
                        terminal: response,
                    });
                }
            }
        }
    }
}
