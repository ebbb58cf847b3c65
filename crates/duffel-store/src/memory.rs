//! In-memory content store.
//!
//! Backs the test suites and embedders that want a self-contained
//! repository: a node tree with content lengths, a package registry under
//! `/etc/packages`, open-session accounting, and assembly knobs (gate,
//! failure injection, call counting) for exercising the engine's
//! concurrency paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use duffel_schema::{AssetReferencedItem, PackageDefinition, PackageId};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::StoreError;
use crate::node::{NodeMeta, Session};
use crate::progress::ProgressSink;
use crate::resolver::ReferenceResolver;
use crate::store::ContentStore;

const PACKAGE_ROOT: &str = "/etc/packages";

#[derive(Debug, Default)]
struct StoredNode {
    content_length: Option<u64>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<String, StoredNode>,
    packages: BTreeMap<String, PackageDefinition>,
    open_sessions: HashSet<u64>,
    next_token: u64,
    assemble_count: u64,
    fail_next_assemble: bool,
}

/// In-memory [`ContentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    assemble_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node at `path`, creating missing ancestors without content.
    pub fn add_node(&self, path: &str, content_length: Option<u64>) {
        let mut inner = self.inner.lock();
        let mut ancestor = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            ancestor.push('/');
            ancestor.push_str(segment);
            inner.nodes.entry(ancestor.clone()).or_default();
        }
        if let Some(node) = inner.nodes.get_mut(path) {
            node.content_length = content_length;
        }
    }

    /// Number of sessions currently open. Every assembly and every engine
    /// operation is expected to bring this back to its prior value.
    pub fn open_session_count(&self) -> usize {
        self.inner.lock().open_sessions.len()
    }

    /// Number of assemblies started so far.
    pub fn assemble_count(&self) -> u64 {
        self.inner.lock().assemble_count
    }

    /// Make the next assembly fail after it has been counted.
    pub fn fail_next_assemble(&self) {
        self.inner.lock().fail_next_assemble = true;
    }

    /// Gate assemblies: each subsequent assembly waits on the returned
    /// handle before doing any work. Call `notify_one` once per held
    /// assembly to release it.
    pub fn gate_assembly(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.assemble_gate.lock() = Some(gate.clone());
        gate
    }

    /// Stored definition at `path`, if any.
    pub fn definition(&self, path: &str) -> Option<PackageDefinition> {
        self.inner.lock().packages.get(path).cloned()
    }

    fn check(&self, session: &Session) -> Result<(), StoreError> {
        if self.inner.lock().open_sessions.contains(&session.token()) {
            Ok(())
        } else {
            Err(StoreError::SessionClosed(session.token()))
        }
    }

    fn direct_children(inner: &Inner, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        inner
            .nodes
            .keys()
            .filter(|p| p.starts_with(&prefix) && !p[prefix.len()..].contains('/'))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn open_session(&self, user_id: &str) -> Result<Session, StoreError> {
        if user_id.trim().is_empty() {
            return Err(StoreError::SessionUnavailable(user_id.to_string()));
        }
        let mut inner = self.inner.lock();
        inner.next_token += 1;
        let token = inner.next_token;
        inner.open_sessions.insert(token);
        Ok(Session::new(user_id, token))
    }

    async fn close_session(&self, session: Session) {
        self.inner.lock().open_sessions.remove(&session.token());
    }

    async fn node(&self, session: &Session, path: &str) -> Result<Option<NodeMeta>, StoreError> {
        self.check(session)?;
        let inner = self.inner.lock();
        Ok(inner.nodes.get(path).map(|node| NodeMeta {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            content_length: node.content_length,
        }))
    }

    async fn children(&self, session: &Session, path: &str) -> Result<Vec<String>, StoreError> {
        self.check(session)?;
        let inner = self.inner.lock();
        Ok(Self::direct_children(&inner, path))
    }

    async fn list_packages_in_group(
        &self,
        session: &Session,
        group: &str,
    ) -> Result<Vec<PackageId>, StoreError> {
        self.check(session)?;
        let inner = self.inner.lock();
        Ok(inner
            .packages
            .values()
            .filter(|definition| definition.group == group)
            .map(PackageDefinition::id)
            .collect())
    }

    async fn list_all_packages(&self, session: &Session) -> Result<Vec<String>, StoreError> {
        self.check(session)?;
        Ok(self.inner.lock().packages.keys().cloned().collect())
    }

    async fn create_definition(
        &self,
        session: &Session,
        definition: &PackageDefinition,
    ) -> Result<String, StoreError> {
        self.check(session)?;
        let path = format!("{PACKAGE_ROOT}/{}/{}", definition.group, definition.node_name());
        let mut inner = self.inner.lock();
        if inner.packages.contains_key(&path) {
            return Err(StoreError::PackageExists(path));
        }
        inner.packages.insert(path.clone(), definition.clone());
        Ok(path)
    }

    async fn open_definition(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<Option<PackageDefinition>, StoreError> {
        self.check(session)?;
        Ok(self.inner.lock().packages.get(path).cloned())
    }

    async fn save_definition(
        &self,
        session: &Session,
        path: &str,
        definition: &PackageDefinition,
    ) -> Result<(), StoreError> {
        self.check(session)?;
        let mut inner = self.inner.lock();
        if !inner.packages.contains_key(path) {
            return Err(StoreError::DefinitionMissing(path.to_string()));
        }
        inner.packages.insert(path.to_string(), definition.clone());
        Ok(())
    }

    async fn assemble(
        &self,
        session: &Session,
        path: &str,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), StoreError> {
        self.check(session)?;
        debug!(%path, user = session.user_id(), "assembling package archive");
        self.inner.lock().assemble_count += 1;

        // The gate clone must not be held across the await.
        let gate = self.assemble_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let fail = std::mem::take(&mut self.inner.lock().fail_next_assemble);
        if fail {
            return Err(StoreError::Backend(format!("assembly failed for {path}")));
        }

        let roots = {
            let inner = self.inner.lock();
            let Some(definition) = inner.packages.get(path) else {
                return Err(StoreError::DefinitionMissing(path.to_string()));
            };
            definition.filter.roots().map(String::from).collect::<Vec<_>>()
        };

        let mut size = 0u64;
        {
            let inner = self.inner.lock();
            for root in &roots {
                if inner.nodes.contains_key(root.as_str()) {
                    sink.progress("A", root);
                    size += inner.nodes[root.as_str()].content_length.unwrap_or(0);
                    let prefix = format!("{}/", root.trim_end_matches('/'));
                    for (descendant, node) in
                        inner.nodes.iter().filter(|(p, _)| p.starts_with(&prefix))
                    {
                        sink.progress("A", descendant);
                        size += node.content_length.unwrap_or(0);
                    }
                } else {
                    let missing = StoreError::NodeNotFound(root.clone());
                    sink.error(&format!("Path not found: {root}"), &missing);
                }
            }
        }

        let mut inner = self.inner.lock();
        if let Some(definition) = inner.packages.get_mut(path) {
            definition.last_wrapped = Some(Utc::now());
            definition.data_size = Some(size);
        }
        Ok(())
    }
}

/// [`ReferenceResolver`] backed by a fixed path-to-items map.
#[derive(Debug, Default)]
pub struct StaticResolver {
    references: BTreeMap<String, Vec<AssetReferencedItem>>,
}

impl StaticResolver {
    /// Create an empty resolver: no path references anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that content at `root_path` references `item`.
    pub fn add_reference(&mut self, root_path: &str, item: AssetReferencedItem) {
        self.references
            .entry(root_path.to_string())
            .or_default()
            .push(item);
    }
}

#[async_trait]
impl ReferenceResolver for StaticResolver {
    async fn resolve(&self, _user_id: &str, root_path: &str) -> HashSet<AssetReferencedItem> {
        self.references
            .get(root_path)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }
}
