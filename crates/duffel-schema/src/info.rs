//! Build/status record shared between the engine and pollers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reference::AssetReferencedItem;
use crate::status::PackageStatus;

/// Prefix for error lines in the build log.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Mutable build/status record for one package path.
///
/// One instance exists per package path, owned by the engine's info cache;
/// the build task appends to it while pollers receive snapshot clones.
/// Serialized as camelCase for transport-layer consumers.
///
/// `data_size` and `package_built` are meaningful only when
/// `package_status` is [`PackageStatus::Built`]. The log is append-only
/// within one build attempt and cleared only when a new attempt starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    /// Repository path of the package node.
    #[serde(default)]
    pub package_path: String,
    /// Node name of the package (last path segment).
    #[serde(default)]
    pub package_node_name: String,
    /// Package name.
    #[serde(default)]
    pub package_name: String,
    /// Package group.
    #[serde(default)]
    pub group_name: String,
    /// Package version.
    #[serde(default)]
    pub version: Option<String>,
    /// Ordered general (explicitly selected) root paths.
    #[serde(default)]
    pub paths: Vec<String>,
    /// Referenced resources: grouping key to concrete asset paths.
    #[serde(default)]
    pub referenced_resources: BTreeMap<String, Vec<String>>,
    /// Thumbnail path recorded on the package definition.
    #[serde(default)]
    pub thumbnail_path: Option<String>,
    /// Size in bytes of the package content.
    #[serde(default)]
    pub data_size: Option<u64>,
    /// Completion time of the last successful assembly.
    #[serde(default)]
    pub package_built: Option<DateTime<Utc>>,
    /// Lifecycle status; `None` until the engine assigns one.
    #[serde(default)]
    pub package_status: Option<PackageStatus>,
    /// Append-only build log.
    #[serde(default)]
    pub log: Vec<String>,
}

impl PackageInfo {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line to the build log.
    pub fn log_message(&mut self, message: impl Into<String>) {
        self.log.push(message.into());
    }

    /// Append an [`ERROR_PREFIX`]ed line to the build log.
    pub fn log_error(&mut self, message: impl std::fmt::Display) {
        self.log.push(format!("{ERROR_PREFIX}{message}"));
    }

    /// Drop all log lines; called at the start of a new build attempt.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Log suffix starting at `index`, for incremental polling.
    ///
    /// Indexes at or past the end yield an empty slice.
    pub fn log_since(&self, index: usize) -> &[String] {
        &self.log[index.min(self.log.len())..]
    }

    /// Record a referenced asset under its grouping key, skipping paths the
    /// key already holds.
    pub fn add_referenced_item(&mut self, item: AssetReferencedItem) {
        let entries = self.referenced_resources.entry(item.key).or_default();
        if !entries.contains(&item.path) {
            entries.push(item.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_error_prefixes() {
        let mut info = PackageInfo::new();
        info.log_error("session is unavailable");
        assert_eq!(info.log, vec!["ERROR: session is unavailable"]);
    }

    #[test]
    fn test_log_since_returns_suffix_for_all_valid_indexes() {
        let mut info = PackageInfo::new();
        for line in ["a", "b", "c"] {
            info.log_message(line);
        }
        for k in 0..=3 {
            assert_eq!(info.log_since(k), &info.log[k..]);
        }
        // Past the end yields an empty slice, not a panic.
        assert!(info.log_since(17).is_empty());
    }

    #[test]
    fn test_add_referenced_item_groups_and_deduplicates() {
        let mut info = PackageInfo::new();
        info.add_referenced_item(AssetReferencedItem::new("image", "/content/dam/a.png"));
        info.add_referenced_item(AssetReferencedItem::new("image", "/content/dam/b.png"));
        info.add_referenced_item(AssetReferencedItem::new("image", "/content/dam/a.png"));
        info.add_referenced_item(AssetReferencedItem::new("document", "/content/dam/c.pdf"));

        assert_eq!(
            info.referenced_resources["image"],
            vec!["/content/dam/a.png", "/content/dam/b.png"]
        );
        assert_eq!(info.referenced_resources["document"], vec!["/content/dam/c.pdf"]);
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut info = PackageInfo::new();
        info.package_name = "site".to_string();
        info.package_status = Some(PackageStatus::Created);

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"packageName\":\"site\""));
        assert!(json.contains("\"packageStatus\":\"CREATED\""));
    }
}
