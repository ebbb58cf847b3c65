//! Content store seam.

use async_trait::async_trait;
use duffel_schema::{PackageDefinition, PackageId};

use crate::error::StoreError;
use crate::node::{NodeMeta, Session};
use crate::progress::ProgressSink;

/// Versioned-content store exposing the read/write/filter primitives the
/// engine needs.
///
/// Implementations decide how sessions map onto the backing repository's
/// authentication model; the contract is only that a session acts under the
/// effective identity it was opened with, and that every opened session is
/// eventually closed.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Open a session acting as `user_id`.
    async fn open_session(&self, user_id: &str) -> Result<Session, StoreError>;

    /// Close a session.
    async fn close_session(&self, session: Session);

    /// Metadata for the node at `path`, or `None` when absent.
    async fn node(&self, session: &Session, path: &str) -> Result<Option<NodeMeta>, StoreError>;

    /// Paths of the direct children of `path`.
    async fn children(&self, session: &Session, path: &str) -> Result<Vec<String>, StoreError>;

    /// Identifiers of all packages in `group`.
    async fn list_packages_in_group(
        &self,
        session: &Session,
        group: &str,
    ) -> Result<Vec<PackageId>, StoreError>;

    /// Paths of all packages in the store.
    async fn list_all_packages(&self, session: &Session) -> Result<Vec<String>, StoreError>;

    /// Persist a new package definition and return the package path.
    async fn create_definition(
        &self,
        session: &Session,
        definition: &PackageDefinition,
    ) -> Result<String, StoreError>;

    /// Read the definition at `path`, or `None` when no package exists there.
    async fn open_definition(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<Option<PackageDefinition>, StoreError>;

    /// Replace the definition at `path`. Builds use this to swap in the
    /// freshly derived filter before assembly.
    async fn save_definition(
        &self,
        session: &Session,
        path: &str,
        definition: &PackageDefinition,
    ) -> Result<(), StoreError>;

    /// Assemble the archive for the package at `path`, streaming progress
    /// into `sink`. On success the stored definition's `last_wrapped` and
    /// `data_size` are stamped.
    async fn assemble(
        &self,
        session: &Session,
        path: &str,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), StoreError>;
}
