//! Registry module for Docker registry interactions
//!
//! This module provides the authentication negotiation, request execution and
//! redirect handling for the Docker Registry HTTP API v2, and the
//! [`RegistryClient`] built on top of them.

pub mod auth;
pub mod challenge;
pub mod client;
pub mod operations;
pub mod token;
pub mod transport;

pub use auth::{AuthInfo, Authenticator, PingResponse, Session, repository_scope};
pub use challenge::{Challenge, parse_challenge};
pub use client::{RegistryClient, RegistryClientBuilder};
pub use operations::{BlobReader, BlobUpload, GetManifestOptions, ManifestResponse, PushResponse};
pub use token::{TokenFetcher, TokenRequest};
pub use transport::{HttpTransport, RedirectSpec, RequestSpec, ResponseChain, ResponseHead};
