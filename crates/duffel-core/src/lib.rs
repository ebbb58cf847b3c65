//! duffel-core - the package build engine.
//!
//! # Overview
//!
//! The engine turns a set of repository root paths plus the assets they
//! reference into a named, versioned content package. Archive assembly runs
//! asynchronously while concurrent callers poll incremental build logs.
//!
//! # Architecture
//!
//! - **Injected collaborators**: the engine owns no repository. It is
//!   constructed with `Arc<dyn ContentStore>` and `Arc<dyn ReferenceResolver>`
//!   handles, so a process-wide engine is the embedder's choice rather than
//!   ambient static state.
//! - **One task per build**: each accepted build spawns exactly one tokio
//!   task. The engine retains the `JoinHandle`, so callers and tests can
//!   await completion deterministically instead of racing a detached thread.
//! - **Shared status records**: [`InfoCache`] owns one shared record per
//!   package path. The build task appends to it while pollers receive
//!   snapshot clones, so a poll is a best-effort point-in-time copy.

pub mod cache;
pub mod config;
pub mod engine;
pub mod size;

// Re-exports
pub use cache::InfoCache;
pub use config::EngineConfig;
pub use engine::PackageEngine;
pub use size::asset_size;
