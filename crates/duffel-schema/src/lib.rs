//! Shared data model for duffel.
//!
//! Everything the engine, the store seam, and transport-layer consumers
//! exchange lives here: the package status machine, the mutable build/status
//! record, the durable package definition, workspace filters, and
//! referenced-asset values.

pub mod definition;
pub mod filter;
pub mod id;
pub mod info;
pub mod reference;
pub mod status;

// Re-exports
pub use definition::PackageDefinition;
pub use filter::{FilterError, PathFilterSet, WorkspaceFilter};
pub use id::PackageId;
pub use info::{ERROR_PREFIX, PackageInfo};
pub use reference::AssetReferencedItem;
pub use status::PackageStatus;

/// Package group used when the caller does not name one.
pub const DEFAULT_PACKAGE_GROUP: &str = "duffel";

/// Repository path of the thumbnail attached to every created package.
pub const THUMBNAIL_PATH: &str = "/apps/duffel/assets/duffel.png";
