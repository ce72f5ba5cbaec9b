//! Manifest operations for registry client
//!
//! Implements Docker Registry v2 and OCI manifest operations:
//! - Manifest download (GET /v2/{name}/manifests/{reference}) with digest verification
//! - Manifest upload (PUT /v2/{name}/manifests/{reference})
//! - Manifest deletion (DELETE /v2/{name}/manifests/{reference})
//! - Accept headers for Docker v2, manifest lists, OCI manifests and OCI indexes

use crate::error::handlers::HttpErrorHandler;
use crate::error::{RegistryError, Result};
use crate::image::digest::{DigestUtils, parse_digest_header, verify_bytes};
use crate::image::manifest::{MEDIATYPE_MANIFEST_V2, Manifest, accept_media_types, declared_media_type};
use crate::logging::{Logger, short_digest};
use crate::registry::auth::Authenticator;
use crate::registry::operations::{DIGEST_HEADER, PushResponse, is_digest};
use crate::registry::transport::{HttpTransport, RedirectSpec, RequestSpec, ResponseHead};
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use url::Url;

/// Options for [`ManifestOperations::get_manifest`]; unset flags fall back to the client config
#[derive(Debug, Clone)]
pub struct GetManifestOptions {
    pub reference: String,
    pub accept_manifest_lists: Option<bool>,
    pub accept_oci_manifests: Option<bool>,
    pub follow_redirects: bool,
}

impl GetManifestOptions {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            accept_manifest_lists: None,
            accept_oci_manifests: None,
            follow_redirects: true,
        }
    }

    pub fn with_manifest_lists(mut self, accept: bool) -> Self {
        self.accept_manifest_lists = Some(accept);
        self
    }

    pub fn with_oci_manifests(mut self, accept: bool) -> Self {
        self.accept_oci_manifests = Some(accept);
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }
}

/// A verified manifest together with the bytes it was parsed from
#[derive(Debug, Clone)]
pub struct ManifestResponse {
    pub manifest: Manifest,
    /// Exact bytes served by the registry
    pub raw: Bytes,
    /// sha256 digest of `raw`
    pub digest: String,
    pub content_type: Option<String>,
    pub responses: Vec<ResponseHead>,
}

#[derive(Clone)]
pub struct ManifestOperations {
    transport: HttpTransport,
    auth: Arc<Authenticator>,
    output: Logger,
    max_redirects: usize,
    accept_manifest_lists: bool,
    accept_oci_manifests: bool,
}

impl ManifestOperations {
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
            accept_manifest_lists: false,
            accept_oci_manifests: false,
        }
    }

    pub fn with_accept_defaults(mut self, manifest_lists: bool, oci_manifests: bool) -> Self {
        self.accept_manifest_lists = manifest_lists;
        self.accept_oci_manifests = oci_manifests;
        self
    }

    fn manifest_url(&self, reference: &str) -> Result<Url> {
        let path = format!("v2/{}/manifests/{}", self.auth.remote_name(), reference);
        Ok(self.auth.base_url().join(&path)?)
    }

    /// Download a manifest, verify its digest and parse it
    pub async fn get_manifest(&self, options: &GetManifestOptions) -> Result<ManifestResponse> {
        let mut headers = self.auth.login_default().await?;

        let lists = options.accept_manifest_lists.unwrap_or(self.accept_manifest_lists);
        let oci = options.accept_oci_manifests.unwrap_or(self.accept_oci_manifests);
        let accept = accept_media_types(lists, oci).join(", ");
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&accept)
                .map_err(|e| RegistryError::Validation(format!("Invalid accept header: {}", e)))?,
        );

        let url = self.manifest_url(&options.reference)?;
        self.output
            .verbose(&format!("Fetching manifest {} ({})", options.reference, accept));

        let chain = self
            .transport
            .follow_redirects(
                RedirectSpec::new(Method::GET, url, headers, self.max_redirects)
                    .also_expect(&[401])
                    .follow(options.follow_redirects),
            )
            .await?;
        let (responses, response) = chain.into_parts();
        let status = response.status();
        let final_url = response.url().to_string();
        let final_headers = response.headers().clone();
        let body = response.bytes().await?;

        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => {
                let err = HttpErrorHandler::from_parts(status, final_url, final_headers, &body);
                return Err(match err.http_error() {
                    Some(http) => {
                        let mut http = http.clone();
                        http.message = format!("Manifest not found: {}", http.message);
                        RegistryError::NotFound(http)
                    }
                    None => err,
                });
            }
            other => {
                return Err(RegistryError::Protocol(format!(
                    "manifest request for {} ended with status {} (redirects disabled)",
                    options.reference, other
                )));
            }
        }

        // the origin response carries the content digest, the last one the body
        let header_digest = responses
            .first()
            .and_then(|head| head.header_str(DIGEST_HEADER))
            .map(str::to_string);
        if is_digest(&options.reference) {
            verify_bytes(parse_digest_header(Some(&options.reference))?, &body)?;
        } else if let Some(declared) = header_digest.as_deref() {
            verify_bytes(parse_digest_header(Some(declared))?, &body)?;
        }

        let content_type = final_headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let manifest = Manifest::from_slice(&body, content_type.as_deref())?;
        let digest = DigestUtils::compute_docker_digest(&body);
        self.output.detail(&format!(
            "Manifest {} is {} ({})",
            options.reference,
            manifest.media_type(),
            short_digest(&digest)
        ));

        Ok(ManifestResponse {
            manifest,
            raw: body,
            digest,
            content_type,
            responses,
        })
    }

    /// Upload a manifest; the content type defaults to the manifest's own `mediaType`
    pub async fn put_manifest(
        &self,
        manifest_data: impl Into<Bytes>,
        reference: &str,
        media_type: Option<&str>,
    ) -> Result<PushResponse> {
        let data: Bytes = manifest_data.into();
        let mut headers = self.auth.login_for(&["pull", "push"]).await?;

        let content_type = media_type
            .map(str::to_string)
            .or_else(|| declared_media_type(&data))
            .unwrap_or_else(|| MEDIATYPE_MANIFEST_V2.to_string());
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&content_type)
                .map_err(|e| RegistryError::Validation(format!("Invalid media type: {}", e)))?,
        );

        let url = self.manifest_url(reference)?;
        self.output.verbose(&format!(
            "Uploading manifest {} ({}, {})",
            reference,
            content_type,
            self.output.format_size(data.len() as u64)
        ));

        let request = RequestSpec::new(Method::PUT, url)
            .headers(headers)
            .body(data)
            .expect(&[201]);
        let response = self
            .transport
            .request(request)
            .await
            .map_err(|e| RegistryError::upload("Manifest upload failed", e))?;

        let pushed = PushResponse::from_headers(response.headers());
        self.output.success(&format!("Manifest {} uploaded", reference));
        Ok(pushed)
    }

    /// Delete a manifest by tag or digest
    pub async fn delete_manifest(&self, reference: &str) -> Result<HeaderMap> {
        let headers = self.auth.login_for(&["pull", "push"]).await?;
        let url = self.manifest_url(reference)?;
        self.output.verbose(&format!("Deleting manifest {}", reference));

        let request = RequestSpec::new(Method::DELETE, url)
            .headers(headers)
            .expect(&[200, 202]);
        let response = self.transport.request(request).await?;
        let response_headers = response.headers().clone();
        response.bytes().await?;

        self.output.success(&format!("Manifest {} deleted", reference));
        Ok(response_headers)
    }
}
