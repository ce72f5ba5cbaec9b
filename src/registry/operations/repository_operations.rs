//! Repository operations for registry client
//!
//! Implements Docker Registry v2 repository-level operations:
//! - Tag listing (GET /v2/{name}/tags/list)

use crate::error::Result;
use crate::logging::Logger;
use crate::registry::auth::Authenticator;
use crate::registry::transport::{HttpTransport, RedirectSpec};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct RepositoryOperations {
    transport: HttpTransport,
    auth: Arc<Authenticator>,
    output: Logger,
    max_redirects: usize,
}

impl RepositoryOperations {
    pub fn new(
        transport: HttpTransport,
        auth: Arc<Authenticator>,
        output: Logger,
        max_redirects: usize,
    ) -> Self {
        Self {
            transport,
            auth,
            output,
            max_redirects,
        }
    }

    /// List tags of the repository; the registry's JSON is returned as-is
    pub async fn list_tags(&self) -> Result<Value> {
        let headers = self.auth.login_default().await?;
        let url = self
            .auth
            .base_url()
            .join(&format!("v2/{}/tags/list", self.auth.remote_name()))?;
        self.output
            .verbose(&format!("Listing tags for {}", self.auth.remote_name()));

        let chain = self
            .transport
            .follow_redirects(RedirectSpec::new(Method::GET, url, headers, self.max_redirects))
            .await?;
        let (_, response) = chain.into_parts();
        let body = response.bytes().await?;
        let tags: Value = serde_json::from_slice(&body)?;

        if let Some(count) = tags.get("tags").and_then(Value::as_array).map(Vec::len) {
            self.output.detail(&format!("Found {} tags", count));
        }
        Ok(tags)
    }
}
