//! Workspace filters: ordered path-rule sets defining package contents.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing filter rule sets.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterError {
    /// The rule-set root was empty.
    #[error("filter root must not be empty")]
    EmptyRoot,

    /// The rule-set root was not an absolute repository path.
    #[error("filter root must be an absolute repository path, got '{0}'")]
    RelativeRoot(String),
}

/// One filter rule set, rooted at a repository path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFilterSet {
    root: String,
}

impl PathFilterSet {
    /// Create a rule set rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::EmptyRoot`] for an empty root and
    /// [`FilterError::RelativeRoot`] when the root does not start with `/`.
    pub fn new(root: impl Into<String>) -> Result<Self, FilterError> {
        let root = root.into();
        if root.is_empty() {
            return Err(FilterError::EmptyRoot);
        }
        if !root.starts_with('/') {
            return Err(FilterError::RelativeRoot(root));
        }
        Ok(Self { root })
    }

    /// The repository path this rule set is rooted at.
    pub fn root(&self) -> &str {
        &self.root
    }
}

/// Ordered collection of [`PathFilterSet`]s describing what a package holds.
///
/// Order is the caller's: roots are appended as given, with no deduplication
/// and no normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFilter {
    filter_sets: Vec<PathFilterSet>,
}

impl WorkspaceFilter {
    /// Build a filter with one rule set per element of `roots`, preserving
    /// input order.
    ///
    /// # Errors
    ///
    /// Propagates the first [`FilterError`] from rule-set construction.
    pub fn from_roots<I, S>(roots: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = Self::default();
        for root in roots {
            filter.add(PathFilterSet::new(root)?);
        }
        Ok(filter)
    }

    /// Append a rule set.
    pub fn add(&mut self, set: PathFilterSet) {
        self.filter_sets.push(set);
    }

    /// The rule sets, in insertion order.
    pub fn filter_sets(&self) -> &[PathFilterSet] {
        &self.filter_sets
    }

    /// Iterator over rule-set roots, in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.filter_sets.iter().map(PathFilterSet::root)
    }

    /// `true` when the filter holds no rule sets ("nothing to package").
    pub fn is_empty(&self) -> bool {
        self.filter_sets.is_empty()
    }

    /// Number of rule sets.
    pub fn len(&self) -> usize {
        self.filter_sets.len()
    }
}
