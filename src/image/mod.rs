//! Image addressing and content types
//!
//! Name parsing for repositories and images, the manifest envelope types,
//! and digest computation and verification.

pub mod digest;
pub mod manifest;
pub mod reference;

pub use digest::{ContentDigest, DigestUtils, DigestVerifier, VerifyingStream, parse_digest_header};
pub use manifest::{Descriptor, ImageManifest, Manifest, ManifestList, Platform, digest_from_manifest_str};
pub use reference::{ImageRef, RepositoryIndex, RepositoryRef, Scheme, parse_index, parse_repo, parse_repo_and_ref};
