//! Bounded, time-expiring package status cache.
//!
//! Single source of truth for "is a build in progress" and for serving
//! partial logs to pollers: at most [`MAX_ENTRIES`] live entries, each
//! expiring a configurable time after its last write. Eviction is size- and
//! time-based only; there is no explicit invalidation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use duffel_schema::PackageInfo;
use parking_lot::Mutex;

/// Maximum number of live entries.
pub const MAX_ENTRIES: usize = 100;

#[derive(Debug)]
struct CacheEntry {
    info: Arc<Mutex<PackageInfo>>,
    written_at: Instant,
}

/// Bounded key-value store from package path to its status record.
///
/// Values are shared handles: the build task mutates the same record that
/// pollers snapshot, so a snapshot is a best-effort point-in-time copy, not
/// a linearizable read. Concurrent `get`/`put` from polling and build tasks
/// never corrupt the mapping itself.
#[derive(Debug)]
pub struct InfoCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InfoCache {
    /// Create a cache whose entries expire `ttl` after their last write.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store `info` under `path`, overwriting any previous entry, and
    /// return the shared handle. The oldest write is evicted when the cache
    /// is full.
    pub fn put(&self, path: &str, info: PackageInfo) -> Arc<Mutex<PackageInfo>> {
        let handle = Arc::new(Mutex::new(info));
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, self.ttl);
        if entries.len() >= MAX_ENTRIES && !entries.contains_key(path) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.written_at)
                .map(|(path, _)| path.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            path.to_string(),
            CacheEntry {
                info: handle.clone(),
                written_at: Instant::now(),
            },
        );
        handle
    }

    /// Snapshot of the entry at `path`, or `None` when absent or expired.
    pub fn get(&self, path: &str) -> Option<PackageInfo> {
        self.handle(path).map(|handle| handle.lock().clone())
    }

    /// Shared handle to the entry at `path`. The engine's build task uses
    /// this; pollers go through [`get`](Self::get) and
    /// [`get_partial`](Self::get_partial).
    pub fn handle(&self, path: &str) -> Option<Arc<Mutex<PackageInfo>>> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, self.ttl);
        entries.get(path).map(|entry| entry.info.clone())
    }

    /// Snapshot with the log truncated to entries at/after `since`, or
    /// `None` when no entry exists for `path`.
    pub fn get_partial(&self, path: &str, since: usize) -> Option<PackageInfo> {
        self.handle(path).map(|handle| {
            let info = handle.lock();
            let mut partial = info.clone();
            partial.log = info.log_since(since).to_vec();
            partial
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, self.ttl);
        entries.len()
    }

    /// `true` when no live entries exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(entries: &mut HashMap<String, CacheEntry>, ttl: Duration) {
        entries.retain(|_, entry| entry.written_at.elapsed() < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duffel_schema::PackageStatus;

    fn info_named(name: &str) -> PackageInfo {
        let mut info = PackageInfo::new();
        info.package_name = name.to_string();
        info
    }

    fn long_lived() -> InfoCache {
        InfoCache::new(Duration::from_secs(3600))
    }

    #[test]
    fn test_put_then_get_returns_equal_info() {
        let cache = long_lived();
        let mut info = info_named("site");
        info.package_status = Some(PackageStatus::Created);
        info.log_message("A /content/a");

        cache.put("/etc/packages/g/site.zip", info.clone());
        let snapshot = cache.get("/etc/packages/g/site.zip").unwrap();
        assert_eq!(snapshot.package_name, info.package_name);
        assert_eq!(snapshot.package_status, info.package_status);
        assert_eq!(snapshot.log, info.log);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = long_lived();
        cache.put("/p", info_named("first"));
        cache.put("/p", info_named("second"));
        assert_eq!(cache.get("/p").unwrap().package_name, "second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_absent_path() {
        let cache = long_lived();
        assert!(cache.get("/nope").is_none());
        assert!(cache.get_partial("/nope", 0).is_none());
    }

    #[test]
    fn test_mutation_through_handle_is_visible_to_pollers() {
        let cache = long_lived();
        let handle = cache.put("/p", info_named("site"));
        handle.lock().log_message("A /content/a");

        assert_eq!(cache.get("/p").unwrap().log, vec!["A /content/a"]);
    }

    #[test]
    fn test_get_partial_truncates_log() {
        let cache = long_lived();
        let mut info = info_named("site");
        for line in ["one", "two", "three"] {
            info.log_message(line);
        }
        cache.put("/p", info);

        for k in 0..=3 {
            let partial = cache.get_partial("/p", k).unwrap();
            let full = cache.get("/p").unwrap();
            assert_eq!(partial.log, full.log[k..].to_vec());
            // Every other field is preserved.
            assert_eq!(partial.package_name, full.package_name);
        }
        assert!(cache.get_partial("/p", 99).unwrap().log.is_empty());
    }

    #[test]
    fn test_capacity_never_exceeds_max_entries() {
        let cache = long_lived();
        for i in 0..MAX_ENTRIES {
            cache.put(&format!("/p{i}"), info_named("x"));
        }
        assert_eq!(cache.len(), MAX_ENTRIES);

        cache.put("/one-more", info_named("y"));
        assert_eq!(cache.len(), MAX_ENTRIES);
        assert!(cache.get("/one-more").is_some());
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache = InfoCache::new(Duration::ZERO);
        cache.put("/p", info_named("site"));
        assert!(cache.get("/p").is_none());
        assert!(cache.is_empty());
    }
}
