//! Package lifecycle status.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a package, as observed by callers polling the engine.
///
/// `Built` and `Error` are terminal for one build attempt; a new build
/// request re-enters `BuildInProgress`. Wire names are the upper-case forms
/// transport consumers expect (`CREATED`, `BUILD_IN_PROGRESS`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageStatus {
    /// A definition exists but no archive has been assembled yet.
    Created,
    /// An assembly task is currently running for this package.
    BuildInProgress,
    /// The last assembly completed and the archive is current.
    Built,
    /// The last creation or assembly attempt failed; see the build log.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&PackageStatus::BuildInProgress).unwrap(),
            "\"BUILD_IN_PROGRESS\""
        );
        assert_eq!(
            serde_json::from_str::<PackageStatus>("\"CREATED\"").unwrap(),
            PackageStatus::Created
        );
    }
}
