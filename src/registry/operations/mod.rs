//! Registry operations grouped by resource
//!
//! Each group shares the client's transport and authenticator; the public
//! entry points are the methods of [`RegistryClient`](crate::RegistryClient).

pub mod blob_operations;
pub mod manifest_operations;
pub mod repository_operations;

pub use blob_operations::{BlobOperations, BlobReader, BlobUpload};
pub use manifest_operations::{GetManifestOptions, ManifestOperations, ManifestResponse};
pub use repository_operations::RepositoryOperations;

use reqwest::header::{HeaderMap, LOCATION};

/// Header carrying the registry's digest of the content
pub const DIGEST_HEADER: &str = "docker-content-digest";

/// True for `algorithm:hex` references as opposed to tags
pub fn is_digest(reference: &str) -> bool {
    reference.contains(':')
}

/// What the registry reported after accepting an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushResponse {
    pub digest: Option<String>,
    pub location: Option<String>,
}

impl PushResponse {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            digest: get(DIGEST_HEADER),
            location: get(LOCATION.as_str()),
        }
    }
}
