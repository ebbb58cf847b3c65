//! Content-size accounting for repository subtrees.

use duffel_store::{ContentStore, Session};
use tracing::warn;

/// Sum the content length of `root` and every descendant node.
///
/// Walks with an explicit work list, so stack depth stays flat regardless
/// of how deep the tree is. A missing root and nodes without binary content
/// contribute zero; store errors during the walk are logged and likewise
/// contribute zero rather than failing the caller.
pub async fn asset_size(store: &dyn ContentStore, session: &Session, root: &str) -> u64 {
    let mut total = 0u64;
    let mut pending = vec![root.to_string()];
    while let Some(path) = pending.pop() {
        match store.node(session, &path).await {
            Ok(Some(node)) => {
                total += node.content_length.unwrap_or(0);
                match store.children(session, &path).await {
                    Ok(children) => pending.extend(children),
                    Err(err) => {
                        warn!(%path, error = %err, "failed to list children during size walk");
                    }
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%path, error = %err, "failed to read node during size walk"),
        }
    }
    total
}
