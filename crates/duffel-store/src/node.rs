//! Sessions and node metadata.

/// Handle to a store session acting under one effective identity.
///
/// Builds run outside the original request's security context but must keep
/// the caller's privileges, so a store opens sessions *as* a given user id
/// (administrative login plus impersonation, in JCR terms). Sessions are
/// not `Clone`: whoever opened one owns it and must hand it back to
/// [`ContentStore::close_session`](crate::ContentStore::close_session) on
/// every exit path, or repository connections leak.
#[derive(Debug)]
pub struct Session {
    user_id: String,
    token: u64,
}

impl Session {
    /// Create a session handle. Store implementations call this; engine
    /// code only receives sessions from
    /// [`ContentStore::open_session`](crate::ContentStore::open_session).
    pub fn new(user_id: impl Into<String>, token: u64) -> Self {
        Self {
            user_id: user_id.into(),
            token,
        }
    }

    /// Effective user identity the session acts under.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Opaque token identifying this session to its store.
    pub fn token(&self) -> u64 {
        self.token
    }
}

/// Metadata for one repository node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMeta {
    /// Node name (last path segment).
    pub name: String,
    /// Full repository path.
    pub path: String,
    /// Content length of the node's binary-content child, when present.
    pub content_length: Option<u64>,
}
