//! Reference URIs.
//!
//! A [`RefUri`] is a path-only locator naming a node inside one document,
//! e.g. `/teams/x/manager`. Its encoded form in a document is a fragment
//! string, `"#" + path`, stored under the `"$ref"` key of a map node.
//!
//! Segments are literal path components: no JSON-Pointer `~0`/`~1`
//! escaping is applied in either direction.

use std::fmt;

use crate::error::{Error, Result};

/// A path-only locator for a node within a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefUri {
    segments: Vec<String>,
}

impl RefUri {
    /// Create a RefUri from pre-split segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RefUri {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a path form such as `/teams/x/manager`.
    ///
    /// The path must be absolute (leading `/`). `/` alone names the
    /// document root.
    pub fn from_path(path: &str) -> Result<Self> {
        let Some(rest) = path.strip_prefix('/') else {
            return Err(Error::InvalidRef {
                value: path.to_string(),
                message: "reference path must start with '/'".to_string(),
            });
        };
        Ok(RefUri {
            segments: split_segments(rest),
        })
    }

    /// Parse a fragment form such as `#/teams/x/manager`.
    ///
    /// `#` alone (or `#/`) names the document root.
    pub fn from_fragment(fragment: &str) -> Result<Self> {
        let Some(rest) = fragment.strip_prefix('#') else {
            return Err(Error::InvalidRef {
                value: fragment.to_string(),
                message: "reference fragment must start with '#'".to_string(),
            });
        };
        if rest.is_empty() {
            return Ok(RefUri { segments: Vec::new() });
        }
        let Some(path) = rest.strip_prefix('/') else {
            return Err(Error::InvalidRef {
                value: fragment.to_string(),
                message: "reference fragment must start with '#/'".to_string(),
            });
        };
        Ok(RefUri {
            segments: split_segments(path),
        })
    }

    /// The literal path components, in order. Empty for the document root.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The path form, e.g. `/teams/x/manager`. The root is `/`.
    pub fn path(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }

    /// The fragment form stored under `"$ref"`, e.g. `#/teams/x/manager`.
    /// The root is `#`.
    pub fn to_fragment(&self) -> String {
        if self.segments.is_empty() {
            "#".to_string()
        } else {
            format!("#/{}", self.segments.join("/"))
        }
    }
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl fmt::Display for RefUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

impl serde::Serialize for RefUri {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_fragment())
    }
}

impl<'de> serde::Deserialize<'de> for RefUri {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fragment = String::deserialize(deserializer)?;
        RefUri::from_fragment(&fragment).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fragment_basic() {
        let uri = RefUri::from_fragment("#/teams/x/manager").unwrap();
        assert_eq!(uri.segments(), &["teams", "x", "manager"]);
        assert_eq!(uri.path(), "/teams/x/manager");
        assert_eq!(uri.to_fragment(), "#/teams/x/manager");
    }

    #[test]
    fn test_from_fragment_root() {
        assert!(RefUri::from_fragment("#").unwrap().segments().is_empty());
        assert!(RefUri::from_fragment("#/").unwrap().segments().is_empty());
    }

    #[test]
    fn test_from_fragment_rejects_bare_path() {
        assert!(RefUri::from_fragment("/teams/x").is_err());
        assert!(RefUri::from_fragment("#teams/x").is_err());
    }

    #[test]
    fn test_from_path_round_trip() {
        let uri = RefUri::from_path("/child").unwrap();
        assert_eq!(uri.to_fragment(), "#/child");
        assert_eq!(RefUri::from_fragment(&uri.to_fragment()).unwrap(), uri);
    }

    #[test]
    fn test_segments_are_literal() {
        // No JSON-Pointer escaping: ~0 and ~1 stay as written.
        let uri = RefUri::from_fragment("#/a~1b/c~0d").unwrap();
        assert_eq!(uri.segments(), &["a~1b", "c~0d"]);
    }

    #[test]
    fn test_display_is_path_form() {
        let uri = RefUri::new(["a", "b"]);
        assert_eq!(uri.to_string(), "/a/b");
    }

    #[test]
    fn test_serde_uses_fragment_form() {
        let uri = RefUri::new(["teams", "x"]);
        let json = serde_json::to_string(&uri).unwrap();
        assert_eq!(json, "\"#/teams/x\"");
        let back: RefUri = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uri);
        assert!(serde_json::from_str::<RefUri>("\"/no-hash\"").is_err());
    }
}
