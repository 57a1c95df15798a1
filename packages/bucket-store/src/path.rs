//! Bucket paths: validated sequences of namespace names.

use std::fmt;

use crate::key;

/// Errors related to bucket path parsing and validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A path component cannot be used as a bucket or key name.
    #[error("invalid name '{component}' at position {position}: {message}")]
    InvalidComponent {
        component: String,
        position: usize,
        message: String,
    },
}

/// A validated path through nested buckets.
///
/// Components may hold any text except the NUL character, which terminates
/// every segment of the encoded key. Socket addresses (`10.0.0.1:80`) and
/// domain names are valid components as-is.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BucketPath {
    components: Vec<String>,
}

impl BucketPath {
    /// The root of the store, above every top-level bucket.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `/`-separated path string.
    ///
    /// Empty components are ignored, so `//` and trailing slashes normalize
    /// away. Use [`BucketPath::child`] for names that contain `/`.
    ///
    /// ```rust
    /// use agentdb_bucket_store::BucketPath;
    ///
    /// let path = BucketPath::parse("portmap/tcp/0.0.0.0:8080").unwrap();
    /// assert_eq!(path.len(), 3);
    /// assert_eq!(path, BucketPath::parse("/portmap/tcp/0.0.0.0:8080/").unwrap());
    /// ```
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let components = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        Self::try_from_components(components)
    }

    /// Try to create a path from components, validating each.
    pub fn try_from_components(components: Vec<String>) -> Result<Self, PathError> {
        for (i, component) in components.iter().enumerate() {
            validate_component(component, i)?;
        }
        Ok(BucketPath { components })
    }

    /// Extend this path by one name.
    pub fn child(&self, name: &str) -> Result<BucketPath, PathError> {
        validate_component(name, self.components.len())?;
        let mut components = self.components.clone();
        components.push(name.to_string());
        Ok(BucketPath { components })
    }

    /// The last component, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The encoded key of the bucket this path names.
    pub(crate) fn to_key(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for component in &self.components {
            key::push_segment(&mut out, component);
        }
        out
    }
}

/// Check a single name against the encoding rules.
pub(crate) fn validate_component(component: &str, position: usize) -> Result<(), PathError> {
    if component.is_empty() {
        return Err(PathError::InvalidComponent {
            component: component.to_string(),
            position,
            message: "name required".to_string(),
        });
    }

    if component.contains('\0') {
        return Err(PathError::InvalidComponent {
            component: component.escape_default().to_string(),
            position,
            message: "names cannot contain NUL".to_string(),
        });
    }

    Ok(())
}

impl fmt::Display for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

impl std::ops::Index<usize> for BucketPath {
    type Output = str;

    fn index(&self, i: usize) -> &Self::Output {
        &self.components[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_paths() {
        assert_eq!(BucketPath::parse("").unwrap().len(), 0);
        assert_eq!(BucketPath::parse("sshtunnels").unwrap().len(), 1);
        assert_eq!(BucketPath::parse("containers/web").unwrap().len(), 2);
        assert!(BucketPath::parse("").unwrap().is_root());
    }

    #[test]
    fn normalize_slashes() {
        assert_eq!(
            BucketPath::parse("foo//bar/").unwrap(),
            BucketPath::parse("foo/bar").unwrap()
        );
    }

    #[test]
    fn sockets_and_domains_are_valid_names() {
        let p = BucketPath::parse("portmap/http/0.0.0.0:80/example.com/10.10.0.2:8080").unwrap();
        assert_eq!(p.len(), 5);
        assert_eq!(&p[3], "example.com");
        assert_eq!(p.name(), Some("10.10.0.2:8080"));
    }

    #[test]
    fn nul_is_rejected() {
        assert!(BucketPath::parse("foo/b\0r").is_err());
        assert!(BucketPath::root().child("a\0").is_err());
    }

    #[test]
    fn empty_child_is_rejected() {
        let err = BucketPath::root().child("").unwrap_err();
        assert!(err.to_string().contains("name required"));
    }

    #[test]
    fn child_allows_slashes() {
        let p = BucketPath::parse("containers").unwrap().child("a/b").unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.to_string(), "containers/a/b");
    }

    #[test]
    fn key_encoding_terminates_segments() {
        let p = BucketPath::parse("portmap/tcp").unwrap();
        assert_eq!(p.to_key(), b"portmap\0tcp\0".to_vec());
        assert!(BucketPath::root().to_key().is_empty());
    }
}
