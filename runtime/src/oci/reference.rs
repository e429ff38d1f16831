//! Image reference parsing.
//!
//! Parses references like `myregistry.example.com:5000/team/app@sha256:...`
//! into registry host, repository path, image name and tag or digest.
//! Parsing never fails: malformed input degrades to a best-effort reading.

/// Registry used when the first path segment is not a hostname.
pub const DEFAULT_REGISTRY: &str = "registry-1.docker.io";

/// Namespace used for unqualified Docker Hub images.
pub const DEFAULT_NAMESPACE: &str = "library";

/// Tag used when the reference names neither a tag nor a digest.
pub const DEFAULT_TAG: &str = "latest";

/// What the last reference segment points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTarget {
    /// `image@sha256:...`
    Digest(String),
    /// `image:tag`
    Tag(String),
    /// `image`, resolved as [`DEFAULT_TAG`]
    Bare,
}

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname, with port if given (e.g., "registry-1.docker.io", "localhost:5000")
    pub registry: String,
    /// Namespace path between registry and image (e.g., "library", "team/sub")
    pub repository_path: String,
    /// Image name (e.g., "nginx")
    pub image: String,
    /// Tag or digest
    pub target: ReferenceTarget,
    /// Every segment before the image, exactly as typed (registry included)
    qualifier: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → registry-1.docker.io, library/nginx, latest
    /// - `library/nginx:stable` → registry-1.docker.io, library/nginx, stable
    /// - `myuser/app` → registry-1.docker.io, myuser/app, latest
    /// - `quay.io/org/app:v1` → quay.io, org/app, v1
    /// - `localhost:5000/team/app@sha256:abc...` → localhost:5000, team/app, sha256:abc...
    ///
    /// The first segment names a registry only if it contains `.` or `:`;
    /// plain `localhost` is taken as a namespace.
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();
        let segments: Vec<&str> = reference.split('/').collect();
        let (last, prefix) = match segments.split_last() {
            Some((last, prefix)) => (*last, prefix),
            None => (reference, &[][..]),
        };

        let (image, target) = if let Some((image, digest)) = split_exactly_once(last, '@') {
            (image, ReferenceTarget::Digest(digest.to_string()))
        } else if let Some((image, tag)) = split_exactly_once(last, ':') {
            (image, ReferenceTarget::Tag(tag.to_string()))
        } else {
            (last, ReferenceTarget::Bare)
        };

        let (registry, repository_path) = match prefix.split_first() {
            Some((first, rest)) if is_registry_host(first) => (first.to_string(), rest.join("/")),
            Some(_) => (DEFAULT_REGISTRY.to_string(), prefix.join("/")),
            None => (DEFAULT_REGISTRY.to_string(), DEFAULT_NAMESPACE.to_string()),
        };

        let qualifier = if prefix.is_empty() {
            None
        } else {
            Some(prefix.join("/"))
        };

        ImageReference {
            registry,
            repository_path,
            image: image.to_string(),
            target,
            qualifier,
        }
    }

    /// Tag or digest to request from the registry.
    pub fn tag_or_digest(&self) -> &str {
        match &self.target {
            ReferenceTarget::Digest(digest) => digest,
            ReferenceTarget::Tag(tag) => tag,
            ReferenceTarget::Bare => DEFAULT_TAG,
        }
    }

    /// Repository name used in registry URLs and token scopes.
    pub fn repository(&self) -> String {
        if self.repository_path.is_empty() {
            self.image.clone()
        } else {
            format!("{}/{}", self.repository_path, self.image)
        }
    }

    /// Tag recorded in the archive's `manifest.json` `RepoTags`.
    pub fn repo_tag(&self) -> String {
        format!("{}:{}", self.repositories_key(), self.tag_or_digest())
    }

    /// Top-level key of the archive's `repositories` file.
    pub fn repositories_key(&self) -> String {
        match &self.qualifier {
            Some(qualifier) => format!("{}/{}", qualifier, self.image),
            // Pulling only an image name, without repository or registry
            None => self.image.clone(),
        }
    }

    /// File name of the final image archive.
    ///
    /// An empty repository path still contributes its `_` separator.
    pub fn archive_name(&self) -> String {
        format!("{}_{}.tar", self.repository_path.replace('/', "_"), self.image)
    }

    /// Name of the scratch directory the archive is assembled in.
    pub fn working_dir_name(&self) -> String {
        format!("tmp_{}_{}", self.image, self.tag_or_digest().replace(':', "@"))
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let separator = match self.target {
            ReferenceTarget::Digest(_) => '@',
            _ => ':',
        };
        write!(
            f,
            "{}/{}{}{}",
            self.registry,
            self.repository(),
            separator,
            self.tag_or_digest()
        )
    }
}

/// Split on `sep` only when it yields exactly two parts.
fn split_exactly_once(s: &str, sep: char) -> Option<(&str, &str)> {
    let (head, tail) = s.split_once(sep)?;
    if tail.contains(sep) {
        None
    } else {
        Some((head, tail))
    }
}

fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':')
}
