//! Repository and image reference parsing
//!
//! Accepts `[scheme://][index/]repo[:tag][@digest]` and produces the index,
//! repository and image structures used to address the registry API.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_INDEX_NAME: &str = "docker.io";
pub const DEFAULT_TAG: &str = "latest";
/// API endpoint of the official index
pub const DEFAULT_V2_REGISTRY: &str = "https://registry-1.docker.io";
const DEFAULT_LOGIN_SERVERNAME: &str = "https://index.docker.io/v1/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The registry host a repository lives on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryIndex {
    /// `host[:port]`
    pub name: String,
    /// Explicit scheme from the input, if one was given
    pub scheme: Option<Scheme>,
    pub official: bool,
}

impl RepositoryIndex {
    /// Effective scheme: explicit, else https. The official index is always https.
    pub fn scheme(&self) -> Scheme {
        if self.official {
            Scheme::Https
        } else {
            self.scheme.unwrap_or(Scheme::Https)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub index: RepositoryIndex,
    /// Path component used in API URLs, e.g. `library/busybox`
    pub remote_name: String,
    /// Name as a user would type it, e.g. `busybox` or `localhost:5000/foo`
    pub local_name: String,
    pub canonical_name: String,
    /// True for `library/` images on the official index
    pub official: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub repo: RepositoryRef,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    /// Tag or digest to address the manifest with; the digest wins when both are set
    pub fn reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// Reassembles the reference from its canonical name
    pub fn canonical_ref(&self) -> String {
        let mut s = self.repo.canonical_name.clone();
        if let Some(tag) = &self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(digest) = &self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_ref())
    }
}

fn looks_like_host(s: &str) -> bool {
    s.contains('.') || s.contains(':') || s == "localhost"
}

/// Parses an index (registry host) name, with an optional scheme prefix
pub fn parse_index(arg: Option<&str>) -> Result<RepositoryIndex> {
    let arg = match arg {
        None | Some("") => DEFAULT_INDEX_NAME,
        Some(DEFAULT_LOGIN_SERVERNAME) => DEFAULT_INDEX_NAME,
        Some(a) => a,
    };

    let (scheme, rest) = match arg.find("://") {
        Some(pos) => {
            let raw = &arg[..pos];
            let scheme = Scheme::parse(raw).ok_or_else(|| {
                RegistryError::InvalidReference(format!(
                    "invalid index, unsupported scheme \"{}\": {}",
                    raw, arg
                ))
            })?;
            (Some(scheme), &arg[pos + 3..])
        }
        None => (None, arg),
    };

    // Tolerate the trailing slash URL builders add
    let mut name = rest.strip_suffix('/').unwrap_or(rest);
    if name.is_empty() {
        return Err(RegistryError::InvalidReference(format!("invalid index, empty host: {}", arg)));
    }
    if !looks_like_host(name) {
        return Err(RegistryError::InvalidReference(format!(
            "invalid index, \"{}\" does not look like a valid host: {}",
            name, arg
        )));
    }
    if name.contains('/') {
        return Err(RegistryError::InvalidReference(format!("invalid index, trailing repo: {}", arg)));
    }
    if name == "index.docker.io" {
        name = DEFAULT_INDEX_NAME;
    }

    let official = name == DEFAULT_INDEX_NAME;
    if official && scheme == Some(Scheme::Http) {
        return Err(RegistryError::InvalidReference(format!(
            "invalid index, plain http used with official index: {}",
            arg
        )));
    }

    Ok(RepositoryIndex {
        name: name.to_string(),
        scheme,
        official,
    })
}

fn validate_namespace(ns: &str) -> Result<()> {
    let invalid = |why: &str| {
        Err(RegistryError::InvalidReference(format!(
            "invalid repository namespace, {}: {}",
            why, ns
        )))
    };
    if ns.len() < 2 || ns.len() > 255 {
        return invalid("must be between 2 and 255 characters");
    }
    if !ns
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'))
    {
        return invalid("may only contain [a-z0-9._-] characters");
    }
    if ns.starts_with('-') || ns.ends_with('-') {
        return invalid("cannot start or end with a hyphen");
    }
    if ns.contains("--") {
        return invalid("cannot contain consecutive hyphens");
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'/' | b'.' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidReference(format!(
            "invalid repository name, may only contain [a-z0-9_/.-] characters: {}",
            name
        )))
    }
}

/// Parses `[scheme://][index/]repo` into a repository reference
pub fn parse_repo(arg: &str, default_index: Option<&RepositoryIndex>) -> Result<RepositoryRef> {
    let (index, remote_raw) = if let Some(pos) = arg.find("://") {
        let slash = arg[pos + 3..].find('/').map(|i| i + pos + 3).ok_or_else(|| {
            RegistryError::InvalidReference(format!(
                "invalid repository name, no \"/REPO\" after hostname: {}",
                arg
            ))
        })?;
        (parse_index(Some(&arg[..slash]))?, &arg[slash + 1..])
    } else {
        match arg.split_once('/') {
            Some((host, rest)) if looks_like_host(host) => (parse_index(Some(host))?, rest),
            _ => {
                let index = match default_index {
                    Some(index) => index.clone(),
                    None => parse_index(None)?,
                };
                (index, arg)
            }
        }
    };

    let (ns, name) = match remote_raw.split_once('/') {
        Some((ns, name)) => {
            validate_namespace(ns)?;
            (Some(ns), name)
        }
        None if index.official => (Some("library"), remote_raw),
        None => (None, remote_raw),
    };
    validate_name(name)?;

    let remote_name = match ns {
        Some(ns) => format!("{}/{}", ns, name),
        None => name.to_string(),
    };

    let (local_name, canonical_name, official) = if index.official {
        let official = ns == Some("library");
        let local = if official { name.to_string() } else { remote_name.clone() };
        let canonical = format!("{}/{}", DEFAULT_INDEX_NAME, local);
        (local, canonical, official)
    } else {
        let local = format!("{}/{}", index.name, remote_name);
        (local.clone(), local, false)
    };

    Ok(RepositoryRef {
        index,
        remote_name,
        local_name,
        canonical_name,
        official,
    })
}

/// Parses `[scheme://][index/]repo[:tag][@digest]`; the tag defaults to `latest`
/// when neither a tag nor a digest is given
pub fn parse_repo_and_ref(arg: &str, default_index: Option<&RepositoryIndex>) -> Result<ImageRef> {
    let (rest, digest) = match arg.rfind('@') {
        Some(pos) => (&arg[..pos], Some(arg[pos + 1..].to_string())),
        None => (arg, None),
    };
    if digest.as_deref() == Some("") {
        return Err(RegistryError::InvalidReference(format!("empty digest: {}", arg)));
    }

    let last_slash = rest.rfind('/');
    let (rest, tag) = match rest.rfind(':') {
        Some(colon) if last_slash.is_none_or(|slash| colon > slash) => {
            (&rest[..colon], Some(rest[colon + 1..].to_string()))
        }
        _ => (rest, None),
    };
    let tag = match tag {
        Some(t) if t.is_empty() => {
            return Err(RegistryError::InvalidReference(format!("empty tag: {}", arg)));
        }
        None if digest.is_none() => Some(DEFAULT_TAG.to_string()),
        other => other,
    };

    Ok(ImageRef {
        repo: parse_repo(rest, default_index)?,
        tag,
        digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_official_short_name() {
        let repo = parse_repo("busybox", None).unwrap();
        assert!(repo.index.official);
        assert!(repo.official);
        assert_eq!(repo.remote_name, "library/busybox");
        assert_eq!(repo.local_name, "busybox");
        assert_eq!(repo.canonical_name, "docker.io/busybox");
    }

    #[test]
    fn test_official_index_user_repo() {
        let repo = parse_repo("index.docker.io/someone/thing", None).unwrap();
        assert_eq!(repo.index.name, "docker.io");
        assert!(!repo.official);
        assert_eq!(repo.remote_name, "someone/thing");
        assert_eq!(repo.canonical_name, "docker.io/someone/thing");
    }

    #[test]
    fn test_private_index_with_port() {
        let repo = parse_repo("localhost:5000/blarg", None).unwrap();
        assert_eq!(repo.index.name, "localhost:5000");
        assert!(!repo.index.official);
        assert_eq!(repo.index.scheme(), Scheme::Https);
        assert_eq!(repo.remote_name, "blarg");
        assert_eq!(repo.canonical_name, "localhost:5000/blarg");
    }

    #[test]
    fn test_scheme_prefix() {
        let repo = parse_repo("http://127.0.0.1:5000/ns/name", None).unwrap();
        assert_eq!(repo.index.scheme, Some(Scheme::Http));
        assert_eq!(repo.remote_name, "ns/name");
    }

    #[test]
    fn test_round_trip() {
        for input in [
            "localhost:5000/blarg:mytag@sha256:cafebabe",
            "localhost:5000/blarg:mytag",
            "localhost:5000/blarg@sha256:cafebabe",
            "quay.io/coreos/etcd:v3.5.0",
            "docker.io/busybox:1.36",
        ] {
            let image = parse_repo_and_ref(input, None).unwrap();
            assert_eq!(image.canonical_ref(), input);
        }
    }

    #[test]
    fn test_tag_defaults_unless_digest() {
        let image = parse_repo_and_ref("busybox", None).unwrap();
        assert_eq!(image.tag.as_deref(), Some("latest"));
        assert_eq!(image.reference(), "latest");

        let image = parse_repo_and_ref("busybox@sha256:abcd", None).unwrap();
        assert_eq!(image.tag, None);
        assert_eq!(image.reference(), "sha256:abcd");
    }

    #[test]
    fn test_default_index_is_used() {
        let index = parse_index(Some("registry.example.com")).unwrap();
        let image = parse_repo_and_ref("team/app:1", Some(&index)).unwrap();
        assert_eq!(image.repo.index.name, "registry.example.com");
        assert_eq!(image.repo.remote_name, "team/app");
    }

    #[test]
    fn test_invalid_namespace() {
        assert!(parse_repo("a/b", None).is_err());
        assert!(parse_repo("-ab/b", None).is_err());
        assert!(parse_repo("ab-/b", None).is_err());
        assert!(parse_repo("a--b/c", None).is_err());
        assert!(parse_repo("AB/c", None).is_err());
    }

    #[test]
    fn test_invalid_name() {
        assert!(matches!(
            parse_repo("Busybox", None),
            Err(RegistryError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_index_errors() {
        assert!(parse_index(Some("http://docker.io")).is_err());
        assert!(parse_index(Some("ftp://example.com")).is_err());
        assert!(parse_index(Some("nohost")).is_err());
        assert!(parse_index(Some("example.com/repo")).is_err());
        assert!(parse_index(Some("https://example.com/")).is_ok());
        assert!(parse_index(Some(DEFAULT_LOGIN_SERVERNAME)).unwrap().official);
    }
}
