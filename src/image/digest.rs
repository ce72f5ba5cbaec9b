//! SHA256 digest utilities and streaming verification
//!
//! Registries identify content by `algorithm:hex` digests. This module parses
//! digest headers, computes digests, and provides [`VerifyingStream`], a
//! pass-through stream stage that hashes every chunk it forwards and fails
//! at end-of-stream when the content does not match.

use crate::error::{RegistryError, Result};
use bytes::Bytes;
use futures_util::Stream;
use futures_util::stream::BoxStream;
use sha2::{Digest, Sha256};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Docker digest with sha256: prefix for empty content
pub const EMPTY_LAYER_DIGEST_FULL: &str =
    "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
        }
    }
}

/// An expected digest, as declared by a header or requested by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    pub algorithm: DigestAlgorithm,
    pub expected_hex: String,
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.expected_hex)
    }
}

/// Parses a `docker-content-digest` style value (`algorithm:hex`)
pub fn parse_digest_header(value: Option<&str>) -> Result<ContentDigest> {
    let value = match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return Err(RegistryError::BadDigest("missing digest header".to_string())),
    };
    let (algorithm, hex) = value
        .split_once(':')
        .ok_or_else(|| RegistryError::BadDigest(format!("could not parse digest header \"{}\"", value)))?;
    match algorithm {
        "sha256" => Ok(ContentDigest {
            algorithm: DigestAlgorithm::Sha256,
            expected_hex: hex.to_string(),
        }),
        other => Err(RegistryError::BadDigest(format!(
            "unsupported digest algorithm \"{}\" in \"{}\"",
            other, value
        ))),
    }
}

/// Utilities for working with SHA256 digests in Docker context
pub struct DigestUtils;

impl DigestUtils {
    pub fn compute_sha256(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Full Docker digest (with sha256: prefix) of byte data
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("sha256:{}", Self::compute_sha256(data))
    }

    pub fn compute_docker_digest_str(data: &str) -> String {
        Self::compute_docker_digest(data.as_bytes())
    }

    /// Validate SHA256 hex string (64 characters, all hex)
    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Validate full Docker digest format (sha256:xxxxx)
    pub fn is_valid_docker_digest(digest: &str) -> bool {
        digest
            .strip_prefix("sha256:")
            .is_some_and(Self::is_valid_sha256_hex)
    }
}

/// Incremental hasher checked against an expected digest
#[derive(Clone)]
pub struct DigestVerifier {
    expected: ContentDigest,
    hasher: Sha256,
}

impl DigestVerifier {
    pub fn new(expected: ContentDigest) -> Self {
        Self {
            expected,
            hasher: Sha256::new(),
        }
    }

    pub fn expected(&self) -> &ContentDigest {
        &self.expected
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Compares the accumulated hash with the expected one
    pub fn finish(self) -> Result<()> {
        let actual = hex::encode(self.hasher.finalize());
        if actual.eq_ignore_ascii_case(&self.expected.expected_hex) {
            Ok(())
        } else {
            Err(RegistryError::BadDigest(format!(
                "content digest mismatch: expected {}, got sha256:{}",
                self.expected, actual
            )))
        }
    }
}

/// Checks a complete in-memory body against an expected digest
pub fn verify_bytes(expected: ContentDigest, data: &[u8]) -> Result<()> {
    let mut verifier = DigestVerifier::new(expected);
    verifier.update(data);
    verifier.finish()
}

/// Pass-through byte stream that verifies digest and length at end-of-stream
///
/// Chunks are forwarded as soon as they arrive; a mismatch is reported as a
/// final error item after the last chunk, so consumers must discard data
/// delivered before an error. Upstream errors are forwarded unchanged and end
/// the stream. Dropping the stream drops the underlying response body.
pub struct VerifyingStream {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    verifier: Option<DigestVerifier>,
    expected_len: Option<u64>,
    received: u64,
    done: bool,
}

impl VerifyingStream {
    pub fn new<S>(inner: S, verifier: Option<DigestVerifier>, expected_len: Option<u64>) -> Self
    where
        S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Box::pin(inner),
            verifier,
            expected_len,
            received: 0,
            done: false,
        }
    }

    /// Bytes forwarded so far
    pub fn received(&self) -> u64 {
        self.received
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(expected) = self.expected_len {
            if expected != self.received {
                return Err(RegistryError::Truncated {
                    expected,
                    received: self.received,
                });
            }
        }
        match self.verifier.take() {
            Some(verifier) => verifier.finish(),
            None => Ok(()),
        }
    }
}

impl Stream for VerifyingStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                this.received += chunk.len() as u64;
                if let Some(verifier) = this.verifier.as_mut() {
                    verifier.update(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.done = true;
                Poll::Ready(Some(Err(RegistryError::Network(err))))
            }
            Poll::Ready(None) => {
                this.done = true;
                match this.finish() {
                    Ok(()) => Poll::Ready(None),
                    Err(err) => Poll::Ready(Some(Err(err))),
                }
            }
        }
    }
}
