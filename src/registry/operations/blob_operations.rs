//! Blob operations for registry client
//!
//! Implements Docker Registry v2 blob operations:
//! - Blob existence checks (HEAD /v2/{name}/blobs/{digest})
//! - Streaming blob download with digest verification (GET /v2/{name}/blobs/{digest})
//! - Monolithic blob upload (POST /v2/{name}/blobs/uploads/ then PUT {location}?digest=)

use crate::error::{RegistryError, Result};
use crate::image::digest::{DigestVerifier, VerifyingStream, parse_digest_header};
use crate::logging::{Logger, short_digest};
use crate::registry::auth::Authenticator;
use crate::registry::operations::{DIGEST_HEADER, PushResponse};
use crate::registry::transport::{HttpTransport, RedirectSpec, RequestSpec, ResponseHead};
use bytes::Bytes;
use futures_util::{Stream, TryStream};
use reqwest::Method;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue, LOCATION};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use url::Url;

const DEFAULT_BLOB_CONTENT_TYPE: &str = "application/octet-stream";

/// A blob download in progress
///
/// Yields the body chunk by chunk; the final item is an error if the content
/// did not match its digest or declared length, in which case everything
/// received must be discarded.
pub struct BlobReader {
    /// Heads of every response in the redirect chain
    pub responses: Vec<ResponseHead>,
    stream: VerifyingStream,
    content_length: Option<u64>,
}

impl BlobReader {
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Bytes delivered so far
    pub fn received(&self) -> u64 {
        self.stream.received()
    }
}

impl Stream for BlobReader {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}

/// Body and metadata for a monolithic blob upload
pub struct BlobUpload {
    pub digest: String,
    pub body: reqwest::Body,
    pub content_length: u64,
    pub content_type: Option<String>,
}

impl BlobUpload {
    pub fn from_bytes(digest: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        Self {
            digest: digest.into(),
            content_length: data.len() as u64,
            body: reqwest::Body::from(data),
            content_type: None,
        }
    }

    pub fn from_stream<S>(digest: impl Into<String>, stream: S, content_length: u64) -> Self
    where
        S: TryStream + Send + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        Bytes: From<S::Ok>,
    {
        Self {
            digest: digest.into(),
            body: reqwest::Body::wrap_stream(stream),
            content_length,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Clone)]
pub struct BlobOperations {
    transport: HttpTransport,
    auth: Arc<Authenticator>,
    output: Logger,
    max_redirects: usize,
}

impl BlobOperations {
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

    fn blob_url(&self, digest: &str) -> Result<Url> {
        let path = format!("v2/{}/blobs/{}", self.auth.remote_name(), digest);
        Ok(self.auth.base_url().join(&path)?)
    }

    /// HEAD a blob, returning every response of the redirect chain
    pub async fn head_blob(&self, digest: &str) -> Result<Vec<ResponseHead>> {
        let headers = self.auth.login_default().await?;
        let url = self.blob_url(digest)?;
        self.output
            .detail(&format!("Checking blob {}", short_digest(digest)));

        let chain = self
            .transport
            .follow_redirects(RedirectSpec::new(Method::HEAD, url, headers, self.max_redirects))
            .await?;
        let (responses, _) = chain.into_parts();
        Ok(responses)
    }

    /// Start streaming a blob. Fails before any bytes are delivered when the
    /// registry reports a different digest than the one requested.
    pub async fn create_blob_read_stream(&self, digest: &str) -> Result<BlobReader> {
        let headers = self.auth.login_default().await?;
        let url = self.blob_url(digest)?;
        self.output
            .verbose(&format!("Downloading blob {}", short_digest(digest)));

        let chain = self
            .transport
            .follow_redirects(RedirectSpec::new(Method::GET, url, headers, self.max_redirects))
            .await?;
        let (responses, response) = chain.into_parts();

        let declared = responses
            .first()
            .and_then(|head| head.header_str(DIGEST_HEADER))
            .map(str::to_string);
        if let Some(declared) = declared.as_deref() {
            if declared != digest {
                return Err(RegistryError::BadDigest(format!(
                    "registry served {} when {} was requested",
                    declared, digest
                )));
            }
        }

        let expected = match declared.as_deref() {
            Some(declared) => Some(parse_digest_header(Some(declared))?),
            None if digest.starts_with("sha256:") => {
                Some(parse_digest_header(Some(digest))?)
            }
            None => None,
        };
        let content_length = response.content_length();
        let stream = VerifyingStream::new(
            response.bytes_stream(),
            expected.map(DigestVerifier::new),
            content_length,
        );

        Ok(BlobReader {
            responses,
            stream,
            content_length,
        })
    }

    /// Upload a whole blob in one request after opening an upload session
    pub async fn blob_upload(&self, upload: BlobUpload) -> Result<PushResponse> {
        let headers = self.auth.login_for(&["pull", "push"]).await?;
        let start_url = self
            .auth
            .base_url()
            .join(&format!("v2/{}/blobs/uploads/", self.auth.remote_name()))?;
        self.output.verbose(&format!(
            "Uploading blob {} ({})",
            short_digest(&upload.digest),
            self.output.format_size(upload.content_length)
        ));

        let response = self
            .transport
            .request(
                RequestSpec::new(Method::POST, start_url.clone())
                    .headers(headers.clone())
                    .expect(&[202]),
            )
            .await
            .map_err(|e| RegistryError::upload("Blob upload rejected", e))?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                RegistryError::upload(
                    "Blob upload rejected",
                    RegistryError::Protocol("upload session has no location".to_string()),
                )
            })?;
        let mut upload_url = start_url.join(location)?;
        upload_url
            .query_pairs_mut()
            .append_pair("digest", &upload.digest);
        self.output.detail(&format!("Upload session at {}", upload_url));

        let content_type = upload
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_BLOB_CONTENT_TYPE);
        let mut put_headers = headers;
        put_headers.insert(CONTENT_LENGTH, HeaderValue::from(upload.content_length));
        put_headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .map_err(|e| RegistryError::Validation(format!("Invalid content type: {}", e)))?,
        );

        let response = self
            .transport
            .request(
                RequestSpec::new(Method::PUT, upload_url)
                    .headers(put_headers)
                    .body(upload.body)
                    .expect(&[201]),
            )
            .await
            .map_err(|e| RegistryError::upload("Blob upload failed", e))?;

        self.output
            .success(&format!("Blob {} uploaded", short_digest(&upload.digest)));
        Ok(PushResponse::from_headers(response.headers()))
    }
}
