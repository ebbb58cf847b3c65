//! Package lifecycle engine: definition creation, asynchronous assembly,
//! progress capture, and status polling.
//!
//! State machine per package path:
//!
//! ```text
//! (none) ---create_package---> CREATED
//! CREATED | BUILT | ERROR ---build_package---> BUILD_IN_PROGRESS
//! BUILD_IN_PROGRESS ---assembly completes---> BUILT
//! BUILD_IN_PROGRESS ---assembly fails-------> ERROR
//! ```
//!
//! `BUILT` and `ERROR` are terminal for one attempt; a new build request
//! re-enters `BUILD_IN_PROGRESS`.

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use duffel_schema::{
    AssetReferencedItem, DEFAULT_PACKAGE_GROUP, PackageDefinition, PackageId, PackageInfo,
    PackageStatus, THUMBNAIL_PATH, WorkspaceFilter,
};
use duffel_store::{ContentStore, ProgressSink, ReferenceResolver, Session, StoreError};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::error;

use crate::cache::InfoCache;
use crate::config::EngineConfig;
use crate::size::asset_size;

/// Orchestrates the package lifecycle against an injected [`ContentStore`]
/// and [`ReferenceResolver`].
///
/// Public operations never raise: every call yields a populated
/// [`PackageInfo`], and callers distinguish failure purely via the status
/// field and the log contents.
pub struct PackageEngine {
    store: Arc<dyn ContentStore>,
    resolver: Arc<dyn ReferenceResolver>,
    cache: InfoCache,
    builds: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl fmt::Debug for PackageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageEngine").finish_non_exhaustive()
    }
}

impl PackageEngine {
    /// Create an engine over the given collaborators.
    pub fn new(
        store: Arc<dyn ContentStore>,
        resolver: Arc<dyn ReferenceResolver>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            cache: InfoCache::new(config.build_info_ttl()),
            builds: Mutex::new(HashMap::new()),
        }
    }

    /// Create a package definition covering `initial_paths` plus the assets
    /// they reference.
    ///
    /// The group defaults to [`DEFAULT_PACKAGE_GROUP`] when blank. Creation
    /// refuses when a package with the same `group:name[:version]` already
    /// exists in the group (compared case-insensitively): the returned
    /// record carries only an error log line and its status stays unset.
    ///
    /// When the resulting filter is empty nothing is persisted, but the
    /// record still reports `Created`: an empty filter means "nothing to
    /// package", not an error.
    pub async fn create_package(
        &self,
        user_id: &str,
        initial_paths: &[String],
        name: &str,
        group: Option<&str>,
        version: Option<&str>,
    ) -> PackageInfo {
        let mut info = PackageInfo::new();
        info.package_name = name.to_string();
        info.paths = initial_paths.to_vec();
        info.version = version
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
        info.thumbnail_path = Some(THUMBNAIL_PATH.to_string());
        let group_name = group
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(DEFAULT_PACKAGE_GROUP)
            .to_string();
        info.group_name = group_name.clone();

        let session = match self.store.open_session(user_id).await {
            Ok(session) => session,
            Err(err) => {
                error!(user = user_id, error = %err, "could not open store session");
                info.log_error(err);
                return info;
            }
        };

        match self.store.list_packages_in_group(&session, &group_name).await {
            Ok(existing) => {
                let candidate = PackageId::new(&group_name, name, info.version.as_deref());
                if existing.iter().any(|id| id.matches(&candidate)) {
                    let message =
                        format!("Package with such name already exist in the {group_name} group.");
                    error!(package = %candidate, "{message}");
                    info.log_error(message);
                    self.store.close_session(session).await;
                    return info;
                }
            }
            Err(err) => {
                error!(error = %err, "error during existing packages check");
                info.log_error(&err);
                info.log_message(format!("{err:?}"));
                self.store.close_session(session).await;
                return info;
            }
        }

        // One resolver pass per initial path, deduplicated by identity.
        let mut referenced: HashSet<AssetReferencedItem> = HashSet::new();
        for path in initial_paths {
            referenced.extend(self.resolver.resolve(user_id, path).await);
        }
        let mut referenced: Vec<AssetReferencedItem> = referenced.into_iter().collect();
        referenced.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.key.cmp(&b.key)));
        for item in &referenced {
            info.add_referenced_item(item.clone());
        }

        // Initial paths first, then resolved asset paths; first occurrence wins.
        let mut resulting: Vec<String> = initial_paths.to_vec();
        for item in referenced {
            if !resulting.contains(&item.path) {
                resulting.push(item.path);
            }
        }

        let filter = match WorkspaceFilter::from_roots(resulting) {
            Ok(filter) => filter,
            Err(err) => {
                error!(error = %err, "invalid package filter");
                info.package_status = Some(PackageStatus::Error);
                info.log_error(err);
                self.store.close_session(session).await;
                return info;
            }
        };

        if filter.is_empty() {
            info.log_message("Nothing to package: the workspace filter is empty.");
            info.package_status = Some(PackageStatus::Created);
            self.store.close_session(session).await;
            return info;
        }

        let definition = PackageDefinition {
            group: group_name,
            name: name.to_string(),
            version: info.version.clone(),
            general_resources: initial_paths.to_vec(),
            referenced_resources: info.referenced_resources.clone(),
            filter: filter.clone(),
            thumbnail_path: info.thumbnail_path.clone(),
            last_wrapped: None,
            data_size: None,
        };
        match self.store.create_definition(&session, &definition).await {
            Ok(package_path) => {
                info.package_node_name = node_name_of(&package_path);
                info.package_path = package_path;
                for root in filter.roots() {
                    info.log_message(format!("A {root}"));
                }
                info.package_status = Some(PackageStatus::Created);
            }
            Err(err) => {
                error!(error = %err, "error during package creation");
                info.package_status = Some(PackageStatus::Error);
                info.log_error(&err);
                info.log_message(format!("{err:?}"));
            }
        }
        self.store.close_session(session).await;
        info
    }

    /// Request an asynchronous build of the package at `package_path`,
    /// including the referenced-resource groups named by `referenced_keys`.
    ///
    /// Returns immediately with the in-progress snapshot; it never waits
    /// for assembly. When a build is already in flight for this path the
    /// existing snapshot is returned unchanged and no second task starts.
    ///
    /// The check-then-set of `BUILD_IN_PROGRESS` and the cache write happen
    /// on the calling task before the assembly task is spawned, so a caller
    /// observing `BUILD_IN_PROGRESS` never duplicates work. The check is
    /// not atomic against a concurrent identical call: two near-simultaneous
    /// requests may both pass it and both start builds. Known limitation,
    /// accepted rather than hardened.
    pub async fn build_package(
        &self,
        user_id: &str,
        package_path: &str,
        referenced_keys: &[String],
    ) -> PackageInfo {
        let mut info = self.get_package_info(user_id, package_path).await;
        if info.package_status == Some(PackageStatus::BuildInProgress) {
            return info;
        }

        info.package_status = Some(PackageStatus::BuildInProgress);
        info.clear_log();
        let shared = self.cache.put(package_path, info.clone());

        let store = self.store.clone();
        let user = user_id.to_string();
        let path = package_path.to_string();
        let keys = referenced_keys.to_vec();
        let handle = tokio::spawn(async move {
            run_assembly(&*store, &user, &path, &keys, &shared).await;
        });
        self.builds.lock().insert(package_path.to_string(), handle);
        info
    }

    /// Await the in-flight assembly task for `package_path`, if any.
    ///
    /// Lets callers and tests observe build completion deterministically.
    /// Returns `true` when a task was awaited.
    pub async fn wait_for_build(&self, package_path: &str) -> bool {
        let handle = self.builds.lock().remove(package_path);
        match handle {
            Some(handle) => {
                let _ = handle.await;
                true
            }
            None => false,
        }
    }

    /// Current status record for the package at `path`.
    ///
    /// A cached record short-circuits. Otherwise the definition is read
    /// from the store: a missing package yields a not-found record (path
    /// plus an error log line); read-time store failures are logged and
    /// yield the record as populated so far, never an error status.
    pub async fn get_package_info(&self, user_id: &str, path: &str) -> PackageInfo {
        if let Some(cached) = self.cache.get(path) {
            return cached;
        }

        let mut info = PackageInfo::new();
        info.package_path = path.to_string();

        let session = match self.store.open_session(user_id).await {
            Ok(session) => session,
            Err(err) => {
                error!(user = user_id, error = %err, "could not open store session");
                info.log_error(err);
                return info;
            }
        };
        if let Err(err) = self.read_package_info(&session, path, &mut info).await {
            error!(%path, error = %err, "error during package opening");
        }
        self.store.close_session(session).await;
        info
    }

    /// Latest cached build info for `package_path`, with the log truncated
    /// to entries at/after `since_index`.
    ///
    /// Pure cache read, the polling primitive: a caller renders incremental
    /// progress by passing the number of log lines it has already seen.
    /// `None` when the cache holds no entry for `package_path`.
    pub fn latest_build_info(&self, package_path: &str, since_index: usize) -> Option<PackageInfo> {
        self.cache.get_partial(package_path, since_index)
    }

    /// Dry run: compute the file set a build of `package_path` with
    /// `referenced_keys` would include and the referenced-content size that
    /// would result, without creating or assembling an archive.
    ///
    /// Touches neither the cache nor the package status.
    pub async fn test_build_package(
        &self,
        user_id: &str,
        package_path: &str,
        referenced_keys: &[String],
    ) -> PackageInfo {
        let mut info = PackageInfo::new();
        info.package_path = package_path.to_string();

        let session = match self.store.open_session(user_id).await {
            Ok(session) => session,
            Err(err) => {
                error!(user = user_id, error = %err, "could not open store session");
                info.log_error(err);
                return info;
            }
        };

        match self.store.open_definition(&session, package_path).await {
            Ok(Some(definition)) => {
                for path in &definition.general_resources {
                    info.log_message(format!("A {path}"));
                }
                let mut total = 0u64;
                for key in referenced_keys {
                    for path in definition.referenced_resources.get(key).into_iter().flatten() {
                        info.log_message(format!("A {path}"));
                        total += asset_size(self.store.as_ref(), &session, path).await;
                    }
                }
                info.data_size = Some(total);
                info.package_built = definition.last_wrapped;
            }
            Ok(None) => {
                info.log_error(format!("no package definition at {package_path}"));
            }
            Err(err) => {
                error!(error = %err, "error during package opening");
            }
        }
        self.store.close_session(session).await;
        info
    }

    async fn read_package_info(
        &self,
        session: &Session,
        path: &str,
        info: &mut PackageInfo,
    ) -> Result<(), StoreError> {
        let known = self.store.list_all_packages(session).await?;
        if !known.iter().any(|p| p == path) {
            let message = format!("Package by this path {path} doesn't exist in the repository.");
            error!("{message}");
            info.log_error(message);
            return Ok(());
        }
        let Some(definition) = self.store.open_definition(session, path).await? else {
            return Err(StoreError::DefinitionMissing(path.to_string()));
        };

        info.package_node_name = node_name_of(path);
        info.package_name = definition.name;
        info.group_name = definition.group;
        info.version = definition.version;
        info.paths = definition.filter.roots().map(String::from).collect();
        info.referenced_resources = definition.referenced_resources;
        info.thumbnail_path = definition.thumbnail_path;
        info.data_size = definition.data_size;
        info.package_built = definition.last_wrapped;
        info.package_status = Some(if definition.last_wrapped.is_some() {
            PackageStatus::Built
        } else {
            PackageStatus::Created
        });
        Ok(())
    }
}

fn node_name_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Streams store progress events into the shared status record.
struct LogSink {
    info: Arc<Mutex<PackageInfo>>,
}

impl ProgressSink for LogSink {
    fn progress(&mut self, status_code: &str, path: &str) {
        self.info.lock().log_message(format!("{status_code} {path}"));
    }

    fn error(&mut self, message: &str, source: &(dyn Error + 'static)) {
        self.info.lock().log_message(format!("{message} {source}"));
    }
}

/// One assembly unit: runs on its own task under the original caller's
/// identity, closes its session on every exit path, and settles the shared
/// record to `Built` or `Error`.
async fn run_assembly(
    store: &dyn ContentStore,
    user_id: &str,
    package_path: &str,
    referenced_keys: &[String],
    shared: &Arc<Mutex<PackageInfo>>,
) {
    let session = match store.open_session(user_id).await {
        Ok(session) => session,
        Err(err) => {
            error!(user = user_id, error = %err, "could not open store session for build");
            let mut info = shared.lock();
            info.package_status = Some(PackageStatus::Error);
            info.log_error(err);
            return;
        }
    };

    let outcome = assemble(store, &session, package_path, referenced_keys, shared).await;
    store.close_session(session).await;

    let mut info = shared.lock();
    match outcome {
        Ok(()) => {
            info.package_built = Some(Utc::now());
            info.package_status = Some(PackageStatus::Built);
        }
        Err(err) => {
            error!(%package_path, error = %err, "error during package generation");
            info.package_status = Some(PackageStatus::Error);
            info.log_error(&err);
            info.log_message(format!("{err:?}"));
        }
    }
}

/// Rebuild the filter from the persisted resource lists and assemble the
/// archive, streaming progress into the shared record.
async fn assemble(
    store: &dyn ContentStore,
    session: &Session,
    package_path: &str,
    referenced_keys: &[String],
    shared: &Arc<Mutex<PackageInfo>>,
) -> anyhow::Result<()> {
    let definition = store
        .open_definition(session, package_path)
        .await?
        .ok_or_else(|| StoreError::DefinitionMissing(package_path.to_string()))?;

    // General resources come back from the definition; referenced groups
    // are narrowed to the keys the caller actually passed.
    let mut roots = definition.general_resources.clone();
    for key in referenced_keys {
        roots.extend(
            definition
                .referenced_resources
                .get(key)
                .into_iter()
                .flatten()
                .cloned(),
        );
    }
    let filter = WorkspaceFilter::from_roots(roots).context("rebuilding workspace filter")?;

    let mut updated = definition;
    updated.filter = filter;
    store
        .save_definition(session, package_path, &updated)
        .await
        .context("saving workspace filter")?;

    let mut sink = LogSink {
        info: shared.clone(),
    };
    store
        .assemble(session, package_path, &mut sink)
        .await
        .context("assembling package archive")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use duffel_store::{MemoryStore, StaticResolver};

    fn engine_over(store: Arc<MemoryStore>, resolver: StaticResolver) -> PackageEngine {
        PackageEngine::new(store, Arc::new(resolver), &EngineConfig::default())
    }

    #[tokio::test]
    async fn test_create_package_with_single_path() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone(), StaticResolver::new());

        let info = engine
            .create_package("alice", &["/content/a".to_string()], "site", None, None)
            .await;

        assert_eq!(info.package_status, Some(PackageStatus::Created));
        assert_eq!(info.group_name, "duffel");
        assert_eq!(info.paths, vec!["/content/a"]);
        assert!(info.referenced_resources.is_empty());
        assert_eq!(info.package_path, "/etc/packages/duffel/site.zip");
        assert_eq!(info.package_node_name, "site.zip");
        assert_eq!(info.log, vec!["A /content/a"]);

        let definition = store.definition("/etc/packages/duffel/site.zip").unwrap();
        let roots: Vec<&str> = definition.filter.roots().collect();
        assert_eq!(roots, vec!["/content/a"]);
        assert_eq!(store.open_session_count(), 0);
    }

    #[tokio::test]
    async fn test_create_package_resolves_references() {
        let store = Arc::new(MemoryStore::new());
        let mut resolver = StaticResolver::new();
        resolver.add_reference("/content/a", AssetReferencedItem::new("image", "/dam/a.png"));
        resolver.add_reference("/content/a", AssetReferencedItem::new("image", "/dam/b.png"));
        let engine = engine_over(store.clone(), resolver);

        let info = engine
            .create_package(
                "alice",
                &["/content/a".to_string()],
                "site",
                Some("mygroup"),
                Some("1.0"),
            )
            .await;

        assert_eq!(info.package_status, Some(PackageStatus::Created));
        assert_eq!(
            info.referenced_resources["image"],
            vec!["/dam/a.png", "/dam/b.png"]
        );

        // The filter covers initial paths first, then resolved assets.
        let definition = store.definition(&info.package_path).unwrap();
        let roots: Vec<&str> = definition.filter.roots().collect();
        assert_eq!(roots, vec!["/content/a", "/dam/a.png", "/dam/b.png"]);
        assert_eq!(definition.general_resources, vec!["/content/a"]);
    }

    #[tokio::test]
    async fn test_create_package_collision() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone(), StaticResolver::new());
        let paths = vec!["/content/a".to_string()];

        let first = engine
            .create_package("alice", &paths, "site", Some("mygroup"), Some("1.0"))
            .await;
        assert_eq!(first.package_status, Some(PackageStatus::Created));

        // A differently-cased name does not dodge the collision check.
        let second = engine
            .create_package("alice", &paths, "SITE", Some("mygroup"), Some("1.0"))
            .await;
        assert_eq!(second.package_status, None);
        assert_eq!(
            second.log,
            vec!["ERROR: Package with such name already exist in the mygroup group."]
        );

        let session = store.open_session("alice").await.unwrap();
        assert_eq!(store.list_all_packages(&session).await.unwrap().len(), 1);
        store.close_session(session).await;
    }

    #[tokio::test]
    async fn test_create_package_with_empty_filter() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone(), StaticResolver::new());

        let info = engine.create_package("alice", &[], "empty", None, None).await;

        // "Nothing to package" is reported as CREATED, not as an error.
        assert_eq!(info.package_status, Some(PackageStatus::Created));
        assert!(info.package_path.is_empty());
        let session = store.open_session("alice").await.unwrap();
        assert!(store.list_all_packages(&session).await.unwrap().is_empty());
        store.close_session(session).await;
    }

    #[tokio::test]
    async fn test_create_package_without_session() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone(), StaticResolver::new());

        let info = engine
            .create_package("", &["/content/a".to_string()], "site", None, None)
            .await;

        assert_eq!(info.package_status, None);
        assert_eq!(info.log.len(), 1);
        assert!(info.log[0].starts_with("ERROR: session is unavailable"));
    }

    #[tokio::test]
    async fn test_get_package_info_for_missing_package() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store, StaticResolver::new());

        let info = engine.get_package_info("alice", "/etc/packages/g/none.zip").await;
        assert_eq!(info.package_path, "/etc/packages/g/none.zip");
        assert_eq!(info.package_status, None);
        assert_eq!(
            info.log,
            vec![
                "ERROR: Package by this path /etc/packages/g/none.zip doesn't exist in the repository."
            ]
        );
    }

    #[tokio::test]
    async fn test_get_package_info_reads_definition() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone(), StaticResolver::new());

        let created = engine
            .create_package(
                "alice",
                &["/content/a".to_string()],
                "site",
                Some("mygroup"),
                Some("1.0"),
            )
            .await;

        let info = engine.get_package_info("alice", &created.package_path).await;
        assert_eq!(info.package_name, "site");
        assert_eq!(info.group_name, "mygroup");
        assert_eq!(info.version.as_deref(), Some("1.0"));
        assert_eq!(info.paths, vec!["/content/a"]);
        assert_eq!(info.package_status, Some(PackageStatus::Created));
        assert_eq!(info.package_built, None);
    }

    #[tokio::test]
    async fn test_latest_build_info_requires_cache_entry() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store, StaticResolver::new());
        assert!(engine.latest_build_info("/etc/packages/g/none.zip", 0).is_none());
    }

    #[tokio::test]
    async fn test_test_build_package_sizes_referenced_assets() {
        let store = Arc::new(MemoryStore::new());
        store.add_node("/content/a", None);
        store.add_node("/dam/a.png", Some(64));
        store.add_node("/dam/b.png", Some(36));

        let mut resolver = StaticResolver::new();
        resolver.add_reference("/content/a", AssetReferencedItem::new("image", "/dam/a.png"));
        resolver.add_reference("/content/a", AssetReferencedItem::new("image", "/dam/b.png"));
        let engine = engine_over(store.clone(), resolver);

        let created = engine
            .create_package("alice", &["/content/a".to_string()], "site", None, None)
            .await;

        let dry = engine
            .test_build_package("alice", &created.package_path, &["image".to_string()])
            .await;
        assert_eq!(dry.data_size, Some(100));
        assert_eq!(dry.package_status, None);
        assert_eq!(
            dry.log,
            vec!["A /content/a", "A /dam/a.png", "A /dam/b.png"]
        );
        // The dry run leaves no trace in the cache.
        assert!(engine.latest_build_info(&created.package_path, 0).is_none());
        assert_eq!(store.open_session_count(), 0);
    }

    #[tokio::test]
    async fn test_test_build_package_without_definition() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store, StaticResolver::new());

        let info = engine
            .test_build_package("alice", "/etc/packages/g/none.zip", &[])
            .await;
        assert_eq!(
            info.log,
            vec!["ERROR: no package definition at /etc/packages/g/none.zip"]
        );
        assert_eq!(info.data_size, None);
    }
}
