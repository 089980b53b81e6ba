//! Paths that bypass both protective policies.

use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;

/// Exact-match set of exempt request paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExemptPaths {
    paths: HashSet<String>,
}

/// Exempt paths shared between the layers and swapped on config reload.
pub type SharedExemptPaths = Arc<ArcSwap<ExemptPaths>>;

impl ExemptPaths {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Matching is exact: `/health` does not exempt `/health/ready`.
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn shared(self) -> SharedExemptPaths {
        Arc::new(ArcSwap::from_pointee(self))
    }
}
