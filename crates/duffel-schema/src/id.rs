//! Composed package identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Composed `group:name[:version]` identifier for a package.
///
/// Collision detection compares identifiers case-insensitively, so
/// `MyGroup:site` and `mygroup:Site` name the same package.
///
/// # Example
///
/// ```
/// use duffel_schema::PackageId;
///
/// let id = PackageId::new("mygroup", "site", Some("1.0"));
/// assert_eq!(id.to_string(), "mygroup:site:1.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageId {
    /// Package group.
    pub group: String,
    /// Package name.
    pub name: String,
    /// Package version; blank versions are treated as absent.
    pub version: Option<String>,
}

impl PackageId {
    /// Create a new identifier. A blank `version` collapses to `None`.
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: Option<&str>) -> Self {
        let version = version
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
        Self {
            group: group.into(),
            name: name.into(),
            version,
        }
    }

    /// Case-insensitive comparison of the composed identifier.
    pub fn matches(&self, other: &PackageId) -> bool {
        self.to_string().eq_ignore_ascii_case(&other.to_string())
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}:{}", self.group, self.name, version),
            None => write!(f, "{}:{}", self.group, self.name),
        }
    }
}
