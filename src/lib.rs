//! Registry Client Library
//!
//! A client for the OCI/Docker Distribution Registry HTTP API v2: repository
//! name parsing, anonymous/Basic/Bearer authentication, and manifest and blob
//! retrieval, upload and deletion with digest verification.

pub mod cli;
pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod registry;

pub use config::ClientConfig;
pub use error::{RegistryError, Result};
pub use image::manifest::digest_from_manifest_str;
pub use image::{ImageRef, Manifest, RepositoryIndex, RepositoryRef, parse_index, parse_repo, parse_repo_and_ref};
pub use logging::Logger;
pub use registry::{
    AuthInfo, BlobReader, BlobUpload, GetManifestOptions, ManifestResponse, PingResponse, PushResponse,
    RegistryClient, RegistryClientBuilder,
};
