//! Manifest envelope types
//!
//! Only schemaVersion 2 documents are understood. The four shapes a registry
//! can return are modelled as variants of [`Manifest`].

use crate::error::{RegistryError, Result};
use crate::image::digest::DigestUtils;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const MEDIATYPE_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIATYPE_MANIFEST_LIST_V2: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIATYPE_OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIATYPE_OCI_MANIFEST_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";

/// Accept header values for a manifest request
pub fn accept_media_types(accept_manifest_lists: bool, accept_oci_manifests: bool) -> Vec<&'static str> {
    let mut types = vec![MEDIATYPE_MANIFEST_V2];
    if accept_manifest_lists {
        types.push(MEDIATYPE_MANIFEST_LIST_V2);
    }
    if accept_oci_manifests {
        types.push(MEDIATYPE_OCI_MANIFEST_V1);
        if accept_manifest_lists {
            types.push(MEDIATYPE_OCI_MANIFEST_INDEX_V1);
        }
    }
    types
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(rename = "os.features", default, skip_serializing_if = "Option::is_none")]
    pub os_features: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
}

/// Content descriptor: a typed pointer to a blob or manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub size: u64,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// Config plus ordered layers (Docker V2 schema 2 or OCI image manifest)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

/// Platform-specific manifest pointers (Docker manifest list or OCI index)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    DockerV2(ImageManifest),
    DockerManifestList(ManifestList),
    Oci(ImageManifest),
    OciIndex(ManifestList),
}

impl Manifest {
    /// Parses a manifest body. `content_type` is consulted when the document
    /// itself carries no `mediaType` (allowed for OCI documents).
    pub fn from_slice(data: &[u8], content_type: Option<&str>) -> Result<Self> {
        let value: Value = serde_json::from_slice(data)?;
        check_schema_version(&value)?;

        let media_type = value
            .get("mediaType")
            .and_then(Value::as_str)
            .or_else(|| content_type.map(|ct| ct.split(';').next().unwrap_or(ct).trim()))
            .map(str::to_string);

        let manifest = match media_type.as_deref() {
            Some(MEDIATYPE_MANIFEST_V2) => Manifest::DockerV2(serde_json::from_value(value)?),
            Some(MEDIATYPE_MANIFEST_LIST_V2) => Manifest::DockerManifestList(serde_json::from_value(value)?),
            Some(MEDIATYPE_OCI_MANIFEST_V1) => Manifest::Oci(serde_json::from_value(value)?),
            Some(MEDIATYPE_OCI_MANIFEST_INDEX_V1) => Manifest::OciIndex(serde_json::from_value(value)?),
            // Untyped documents are told apart by shape
            _ if value.get("manifests").is_some() => Manifest::OciIndex(serde_json::from_value(value)?),
            _ if value.get("layers").is_some() => Manifest::Oci(serde_json::from_value(value)?),
            Some(other) => {
                return Err(RegistryError::Unsupported(format!(
                    "unsupported manifest media type: {}",
                    other
                )));
            }
            None => {
                return Err(RegistryError::Parse(
                    "manifest has neither a mediaType nor a recognizable shape".to_string(),
                ));
            }
        };
        Ok(manifest)
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Manifest::DockerV2(_) => MEDIATYPE_MANIFEST_V2,
            Manifest::DockerManifestList(_) => MEDIATYPE_MANIFEST_LIST_V2,
            Manifest::Oci(_) => MEDIATYPE_OCI_MANIFEST_V1,
            Manifest::OciIndex(_) => MEDIATYPE_OCI_MANIFEST_INDEX_V1,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Manifest::DockerManifestList(_) | Manifest::OciIndex(_))
    }

    /// Every blob or manifest this document points at
    pub fn descriptors(&self) -> Vec<&Descriptor> {
        match self {
            Manifest::DockerV2(m) | Manifest::Oci(m) => std::iter::once(&m.config).chain(m.layers.iter()).collect(),
            Manifest::DockerManifestList(l) | Manifest::OciIndex(l) => l.manifests.iter().collect(),
        }
    }
}

impl Serialize for Manifest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Manifest::DockerV2(m) | Manifest::Oci(m) => m.serialize(serializer),
            Manifest::DockerManifestList(l) | Manifest::OciIndex(l) => l.serialize(serializer),
        }
    }
}

fn check_schema_version(value: &Value) -> Result<()> {
    match value.get("schemaVersion").and_then(Value::as_u64) {
        Some(2) => Ok(()),
        Some(1) => Err(RegistryError::Unsupported(
            "schemaVersion 1 manifests are not supported".to_string(),
        )),
        Some(other) => Err(RegistryError::Unsupported(format!(
            "unknown manifest schemaVersion: {}",
            other
        ))),
        None => Err(RegistryError::Parse("manifest has no schemaVersion".to_string())),
    }
}

/// The `mediaType` declared inside a raw manifest, if any
pub fn declared_media_type(data: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(data)
        .ok()?
        .get("mediaType")?
        .as_str()
        .map(str::to_string)
}

/// Digest of a manifest as the registry computes it: sha256 over the exact
/// bytes given, not over a re-serialization.
pub fn digest_from_manifest_str(manifest: &str) -> Result<String> {
    let value: Value = serde_json::from_str(manifest)?;
    if value.get("schemaVersion").and_then(Value::as_u64) == Some(1) {
        return Err(RegistryError::Unsupported(
            "cannot compute digest of a schemaVersion 1 manifest".to_string(),
        ));
    }
    Ok(DigestUtils::compute_docker_digest_str(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCKER_V2: &str = r#"{
   "schemaVersion": 2,
   "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
   "config": {
      "mediaType": "application/vnd.docker.container.image.v1+json",
      "size": 1457,
      "digest": "sha256:a416a98b71e224a31ee99cff8e16063554498227d2b696152a9c3e0aa65e5824"
   },
   "layers": [
      {
         "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
         "size": 2479,
         "digest": "sha256:2c39bef88607c1a4c1ab2e33bea9a0ab6a3d2b6a47b2d6b3a5b3f3d8d6c5a4b3"
      }
   ]
}"#;

    const OCI_INDEX: &str = r#"{
  "schemaVersion": 2,
  "manifests": [
    {
      "mediaType": "application/vnd.oci.image.manifest.v1+json",
      "size": 7143,
      "digest": "sha256:e692418e4cbaf90ca69d05a66403747baa33ee08806650b51fab815ad7fc331f",
      "platform": { "architecture": "arm64", "os": "linux", "variant": "v8" }
    }
  ]
}"#;

    #[test]
    fn test_parse_docker_v2() {
        let manifest = Manifest::from_slice(DOCKER_V2.as_bytes(), None).unwrap();
        match &manifest {
            Manifest::DockerV2(m) => {
                assert_eq!(m.config.size, 1457);
                assert_eq!(m.layers.len(), 1);
            }
            other => panic!("unexpected variant {:?}", other),
        }
        assert_eq!(manifest.descriptors().len(), 2);
        assert!(!manifest.is_list());
    }

    #[test]
    fn test_untyped_index_is_detected_by_shape() {
        let manifest = Manifest::from_slice(OCI_INDEX.as_bytes(), None).unwrap();
        let Manifest::OciIndex(index) = &manifest else {
            panic!("expected OCI index");
        };
        let platform = index.manifests[0].platform.as_ref().unwrap();
        assert_eq!(platform.architecture, "arm64");
        assert_eq!(platform.variant.as_deref(), Some("v8"));
        assert_eq!(manifest.media_type(), MEDIATYPE_OCI_MANIFEST_INDEX_V1);
    }

    #[test]
    fn test_content_type_fills_missing_media_type() {
        let body = r#"{"schemaVersion":2,"manifests":[]}"#;
        let manifest = Manifest::from_slice(
            body.as_bytes(),
            Some("application/vnd.docker.distribution.manifest.list.v2+json; charset=utf-8"),
        )
        .unwrap();
        assert!(matches!(manifest, Manifest::DockerManifestList(_)));
    }

    #[test]
    fn test_schema_version_1_is_rejected() {
        let v1 = r#"{"schemaVersion":1,"name":"library/busybox","tag":"latest","fsLayers":[]}"#;
        assert!(matches!(
            Manifest::from_slice(v1.as_bytes(), Some(MEDIATYPE_MANIFEST_V2)),
            Err(RegistryError::Unsupported(_))
        ));
        assert!(matches!(digest_from_manifest_str(v1), Err(RegistryError::Unsupported(_))));
    }

    #[test]
    fn test_digest_is_over_raw_bytes() {
        let compact = r#"{"schemaVersion":2,"a":1,"b":2}"#;
        let reordered = r#"{"b":2,"schemaVersion":2,"a":1}"#;
        let d1 = digest_from_manifest_str(compact).unwrap();
        assert_eq!(d1, digest_from_manifest_str(compact).unwrap());
        assert_ne!(d1, digest_from_manifest_str(reordered).unwrap());
        assert_eq!(d1, DigestUtils::compute_docker_digest(compact.as_bytes()));
        assert!(d1.starts_with("sha256:"));
    }

    #[test]
    fn test_digest_requires_json() {
        assert!(matches!(digest_from_manifest_str("not json"), Err(RegistryError::Parse(_))));
    }

    #[test]
    fn test_accept_media_types() {
        assert_eq!(accept_media_types(false, false), vec![MEDIATYPE_MANIFEST_V2]);
        assert_eq!(
            accept_media_types(true, false),
            vec![MEDIATYPE_MANIFEST_V2, MEDIATYPE_MANIFEST_LIST_V2]
        );
        assert_eq!(
            accept_media_types(false, true),
            vec![MEDIATYPE_MANIFEST_V2, MEDIATYPE_OCI_MANIFEST_V1]
        );
        assert_eq!(accept_media_types(true, true).len(), 4);
    }

    #[test]
    fn test_serialize_keeps_camel_case() {
        let manifest = Manifest::from_slice(DOCKER_V2.as_bytes(), None).unwrap();
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["config"]["mediaType"], "application/vnd.docker.container.image.v1+json");
    }
}
