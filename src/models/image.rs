use crate::error::{Error, Result};
use oci_distribution::Reference;
use std::fmt;
use std::str::FromStr;

/// Canonical registry host plus repository path, without tag or digest.
///
/// Examples:
///   "nginx" -> "docker.io/library/nginx"
///   "ghcr.io/org/app" -> "ghcr.io/org/app"
///   "localhost:5000/app" -> "localhost:5000/app"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageLocation {
    registry: String,
    repository: String,
}

impl ImageLocation {
    pub fn parse(image: &str) -> Result<Self> {
        let image = image.trim();
        let invalid = |reason: &str| Error::InvalidImage {
            image: image.to_string(),
            reason: reason.to_string(),
        };

        if image.is_empty() {
            return Err(invalid("image must not be empty"));
        }
        if image.contains('@') {
            return Err(invalid("image must not contain a digest"));
        }
        // A colon in the last path segment is a tag, anywhere else a registry port
        if image
            .rsplit('/')
            .next()
            .is_some_and(|segment| segment.contains(':'))
        {
            return Err(invalid("image must not contain a tag"));
        }

        let reference = Reference::from_str(image).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            registry: reference.registry().to_string(),
            repository: reference.repository().to_string(),
        })
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// OCI reference used for registry API calls. The tag is irrelevant for
    /// listing and only satisfies the reference grammar.
    pub fn reference(&self) -> Reference {
        Reference::with_tag(
            self.registry.clone(),
            self.repository.clone(),
            "latest".to_string(),
        )
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)
    }
}
