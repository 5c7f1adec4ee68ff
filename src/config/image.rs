//! Container image references.

use std::fmt;

/// A parsed image reference: repository plus optional tag.
///
/// `From<&str>` parsing is lenient so it can sit behind the builder's
/// `with_image`; use [`ImageRef::parse`] for strict validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    repository: String,
    tag: Option<String>,
}

impl ImageRef {
    /// Create a reference from repository and tag parts.
    pub fn new<R: Into<String>, T: Into<String>>(repository: R, tag: T) -> Self {
        Self {
            repository: repository.into(),
            tag: Some(tag.into()),
        }
    }

    /// Parse a `repository[:tag]` string, rejecting empty input.
    pub fn parse(reference: &str) -> crate::Result<Self> {
        if reference.trim().is_empty() {
            return Err(crate::Error::Configuration(
                "image reference must not be empty".to_string(),
            ));
        }
        Ok(Self::from(reference))
    }

    /// The repository part, e.g. `docker.io/library/redis`.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The tag, if one was given.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The full reference with the tag defaulted to `latest`.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.repository, self.tag.as_deref().unwrap_or("latest"))
    }
}

impl From<&str> for ImageRef {
    fn from(reference: &str) -> Self {
        // A colon after the last slash separates the tag; a colon before it
        // belongs to a registry port (e.g. localhost:5000/repo).
        let split_at = reference
            .rfind(':')
            .filter(|idx| !reference[*idx..].contains('/'));

        match split_at {
            Some(idx) => Self {
                repository: reference[..idx].to_string(),
                tag: Some(reference[idx + 1..].to_string()),
            },
            None => Self {
                repository: reference.to_string(),
                tag: None,
            },
        }
    }
}

impl From<String> for ImageRef {
    fn from(reference: String) -> Self {
        Self::from(reference.as_str())
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.repository, tag),
            None => write!(f, "{}", self.repository),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repository_and_tag() {
        let image = ImageRef::from("redis:7-alpine");
        assert_eq!(image.repository(), "redis");
        assert_eq!(image.tag(), Some("7-alpine"));
        assert_eq!(image.to_string(), "redis:7-alpine");
    }

    #[test]
    fn parses_registry_port_without_tag() {
        let image = ImageRef::from("localhost:5000/library/app");
        assert_eq!(image.repository(), "localhost:5000/library/app");
        assert_eq!(image.tag(), None);
        assert_eq!(image.canonical(), "localhost:5000/library/app:latest");
    }

    #[test]
    fn parses_registry_port_with_tag() {
        let image = ImageRef::from("localhost:5000/library/app:1.2");
        assert_eq!(image.repository(), "localhost:5000/library/app");
        assert_eq!(image.tag(), Some("1.2"));
    }

    #[test]
    fn rejects_empty_reference() {
        assert!(ImageRef::parse("  ").is_err());
    }
}
