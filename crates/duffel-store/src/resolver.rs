//! Reference discovery seam.

use std::collections::HashSet;

use async_trait::async_trait;
use duffel_schema::AssetReferencedItem;

/// Discovers the assets a piece of content references.
///
/// Given a root path, implementations return the set of distinct referenced
/// items reachable from it (e.g. images linked from a page). The engine
/// invokes the resolver once per initial path and deduplicates the combined
/// output by identity.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Resolve the assets referenced from `root_path`, acting as `user_id`.
    async fn resolve(&self, user_id: &str, root_path: &str) -> HashSet<AssetReferencedItem>;
}
