//! Durable package definition persisted in the content store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::WorkspaceFilter;
use crate::id::PackageId;

/// Durable record describing a package's identity, filter, and resource
/// lists.
///
/// Created once by package creation and never deleted by the engine. Each
/// build replaces the filter, and the store stamps `last_wrapped` and
/// `data_size` on successful assembly. The resource lists are persisted
/// structurally rather than as the encoded side-channel strings some
/// stores use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageDefinition {
    /// Package group.
    pub group: String,
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: Option<String>,
    /// Ordered general (explicitly selected) root paths.
    pub general_resources: Vec<String>,
    /// Referenced resources recorded at creation: grouping key to asset paths.
    pub referenced_resources: BTreeMap<String, Vec<String>>,
    /// Workspace filter describing the archive manifest.
    pub filter: WorkspaceFilter,
    /// Thumbnail path attached to the package.
    pub thumbnail_path: Option<String>,
    /// Completion time of the last successful assembly.
    pub last_wrapped: Option<DateTime<Utc>>,
    /// Size in bytes of the assembled archive.
    pub data_size: Option<u64>,
}

impl PackageDefinition {
    /// Composed identifier, for collision checks.
    pub fn id(&self) -> PackageId {
        PackageId::new(&self.group, &self.name, self.version.as_deref())
    }

    /// Node name the package is stored under: `name-version.zip`, or
    /// `name.zip` when no version is set.
    pub fn node_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{}-{}.zip", self.name, version),
            None => format!("{}.zip", self.name),
        }
    }
}
