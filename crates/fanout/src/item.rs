//! Work items: the immutable input of a batch.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a work item.
pub type ItemId = CompactString;

/// One unit of work to be performed concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Identifier carried into the item's result.
    pub id: ItemId,
    /// Operation parameter, e.g. the URL to fetch.
    pub target: String,
}

impl WorkItem {
    /// Create a work item with a distinct id and target.
    pub fn new(id: impl Into<ItemId>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
        }
    }

    /// Create a work item whose id is the URL itself.
    pub fn url(url: impl Into<String>) -> Self {
        let target = url.into();
        Self {
            id: CompactString::from(target.as_str()),
            target,
        }
    }
}

impl From<&str> for WorkItem {
    fn from(url: &str) -> Self {
        Self::url(url)
    }
}

impl From<String> for WorkItem {
    fn from(url: String) -> Self {
        Self::url(url)
    }
}
