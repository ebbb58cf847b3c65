//! Referenced-asset values produced by the reference resolver.

use serde::{Deserialize, Serialize};

/// One asset discovered by following links from explicitly selected content.
///
/// Items are grouped under `key` (typically an asset kind such as `"image"`)
/// so a later build can include or skip a whole reference group at once.
/// Identity covers both fields; the engine deduplicates resolver output
/// through a `HashSet`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetReferencedItem {
    /// Grouping key the asset is filed under.
    pub key: String,
    /// Repository path of the asset itself.
    pub path: String,
}

impl AssetReferencedItem {
    /// Create a new referenced item.
    pub fn new(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
        }
    }
}
