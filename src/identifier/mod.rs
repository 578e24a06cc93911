//! Compound image identifiers
//!
//! Parses `[registry/]repository[:tag]` references. The tag separator is the last
//! colon after the last slash, so a registry port (`registry.my.com:5000/repo`) is
//! never mistaken for a tag.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{EngineError, Result};

/// A parsed image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ImageIdentifier {
    /// Repository path, registry-qualified when the reference carried a registry
    repository: String,

    /// Tag, if one was given. An absent tag is left for the runtime to default.
    tag: Option<String>,
}

impl ImageIdentifier {
    /// Parse a compound reference such as `registry.my.com/somerepo:1.0.0.2x`.
    ///
    /// Surrounding whitespace is trimmed first, so a blank string is rejected as
    /// empty. Digest references (`alpine@sha256:...`) are not supported and are
    /// rejected as malformed.
    pub fn parse(compound: &str) -> Result<Self> {
        let compound = compound.trim();
        if compound.is_empty() || compound.contains('@') {
            return Err(EngineError::MalformedIdentifier(compound.to_string()));
        }

        let last_slash = compound.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match compound[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&compound[..split], Some(&compound[split + 1..]))
            }
            None => (compound, None),
        };

        // Every path segment must be present: rejects ":tag", "host/", "a//b"
        if repository.split('/').any(str::is_empty) {
            return Err(EngineError::MalformedIdentifier(compound.to_string()));
        }
        if tag.is_some_and(str::is_empty) {
            return Err(EngineError::MalformedIdentifier(compound.to_string()));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.map(str::to_string),
        })
    }

    /// Build an identifier from a separate repository and tag
    pub fn new(repository: &str, tag: &str) -> Result<Self> {
        Self::parse(&format!("{}:{}", repository, tag))
    }

    /// Registry-qualified repository path
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Registry host (with port, if any) when the first segment names one
    pub fn registry(&self) -> Option<&str> {
        let (first, _) = self.repository.split_once('/')?;
        is_registry_host(first).then_some(first)
    }

    /// Repository path with the registry stripped
    pub fn path(&self) -> &str {
        match self.registry() {
            Some(registry) => &self.repository[registry.len() + 1..],
            None => &self.repository,
        }
    }
}

/// Same heuristic the Docker CLI applies to the first path component
fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

impl FromStr for ImageIdentifier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.repository, tag),
            None => f.write_str(&self.repository),
        }
    }
}
