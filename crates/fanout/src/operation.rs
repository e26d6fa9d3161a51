//! The executor capability supplied by the caller.

use crate::item::WorkItem;
use std::future::Future;

/// Performs the work described by a [`WorkItem`].
///
/// Implementations are shared by every task of a batch. The returned future
/// may be dropped at any await point when the item's context fires first.
pub trait Operation: Send + Sync + 'static {
    /// Payload produced on success.
    type Output: Send + 'static;

    /// Perform the operation for one item.
    fn execute(&self, item: &WorkItem)
    -> impl Future<Output = anyhow::Result<Self::Output>> + Send;
}

/// An [`Operation`] backed by a closure, created by [`from_fn`].
#[derive(Clone)]
pub struct FromFn<F> {
    f: F,
}

/// Wrap a closure taking an owned [`WorkItem`] as an [`Operation`].
///
/// ```rust,ignore
/// let op = fanout::from_fn(|item: WorkItem| async move { Ok(item.target.len()) });
/// ```
pub fn from_fn<F, Fut, T>(f: F) -> FromFn<F>
where
    F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    FromFn { f }
}

impl<F, Fut, T> Operation for FromFn<F>
where
    F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn execute(&self, item: &WorkItem) -> impl Future<Output = anyhow::Result<T>> + Send {
        (self.f)(item.clone())
    }
}
