//! Fan-out dispatcher.
//!
//! [`Dispatcher::dispatch`] spawns one worker task per item and returns a
//! [`Batch`] for the caller to pass to [`Batch::collect`]. Launching is
//! fire-and-forget; the dispatcher never waits on its tasks.

use crate::{
    context::{Canceller, Context},
    item::{ItemId, WorkItem},
    operation::Operation,
    result::WorkResult,
    worker::Worker,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{Semaphore, mpsc},
    time::Instant,
};

/// How cancellation contexts are assigned to the tasks of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPolicy {
    /// One context with one deadline, shared by every task.
    SharedDeadline(Duration),
    /// One cancellable context per item, cancelled through [`CancelHandle`].
    PerItemCancel,
    /// One context per item, each with its own timeout from launch.
    PerItemTimeout(Duration),
}

/// Buffering of the result channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelCapacity {
    /// One slot per item: no worker ever waits on its send.
    #[default]
    Batch,
    /// A single slot: workers hand results over one at a time.
    Rendezvous,
}

/// Launches batches of work against one shared [`Operation`].
///
/// Build it once at composition time and pass it by reference to whatever
/// needs to dispatch.
pub struct Dispatcher<O> {
    op: Arc<O>,
    limit: Option<usize>,
    capacity: ChannelCapacity,
}

impl<O: Operation> Dispatcher<O> {
    /// Create a dispatcher with unbounded fan-out.
    pub fn new(op: O) -> Self {
        Self::from_arc(Arc::new(op))
    }

    /// Create a dispatcher around an operation that is already shared.
    pub fn from_arc(op: Arc<O>) -> Self {
        Self {
            op,
            limit: None,
            capacity: ChannelCapacity::default(),
        }
    }

    /// Bound the number of operations running at once within a batch.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self
    }

    /// Choose the result channel buffering.
    pub fn capacity(mut self, capacity: ChannelCapacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Dispatch `items` under a fresh root context.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch<I>(&self, items: I, policy: ContextPolicy) -> Batch<O::Output>
    where
        I: IntoIterator,
        I::Item: Into<WorkItem>,
    {
        self.dispatch_in(&Context::background(), items, policy)
    }

    /// Dispatch `items` with every context derived from `parent`.
    ///
    /// Firing `parent` fires every task of the batch.
    pub fn dispatch_in<I>(
        &self,
        parent: &Context,
        items: I,
        policy: ContextPolicy,
    ) -> Batch<O::Output>
    where
        I: IntoIterator,
        I::Item: Into<WorkItem>,
    {
        let items: Vec<WorkItem> = items.into_iter().map(Into::into).collect();
        let started = Instant::now();
        let slots = match self.capacity {
            ChannelCapacity::Batch => items.len().max(1),
            ChannelCapacity::Rendezvous => 1,
        };
        let (tx, rx) = mpsc::channel(slots);
        let gate = self.limit.map(|limit| Arc::new(Semaphore::new(limit)));

        let mut cancellers = match policy {
            ContextPolicy::SharedDeadline(timeout) => {
                let (ctx, canceller) = Context::with_timeout(parent, timeout);
                Cancellers::Shared(ctx, canceller)
            }
            ContextPolicy::PerItemCancel | ContextPolicy::PerItemTimeout(_) => {
                Cancellers::PerItem(Vec::with_capacity(items.len()))
            }
        };

        let mut ids = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let ctx = match &mut cancellers {
                Cancellers::Shared(ctx, _) => ctx.clone(),
                Cancellers::PerItem(per_item) => {
                    let (ctx, canceller) = match policy {
                        ContextPolicy::PerItemTimeout(timeout) => {
                            Context::with_timeout(parent, timeout)
                        }
                        _ => Context::with_cancel(parent),
                    };
                    per_item.push(canceller);
                    ctx
                }
            };
            ids.push(item.id.clone());
            let worker = Worker {
                index,
                item,
                ctx,
                op: Arc::clone(&self.op),
                gate: gate.clone(),
                tx: tx.clone(),
            };
            tokio::spawn(worker.run());
        }

        tracing::info!("dispatched {} item(s) with {policy:?}", ids.len());
        let ids: Arc<[ItemId]> = ids.into();
        Batch {
            rx,
            cancel: CancelHandle {
                ids: Arc::clone(&ids),
                cancellers: Arc::new(cancellers),
            },
            ids,
            started,
        }
    }
}

enum Cancellers {
    Shared(Context, Canceller),
    PerItem(Vec<Canceller>),
}

/// Handle on the contexts of a dispatched batch.
///
/// Cheap to clone, so it can be moved into another task while the batch is
/// being collected.
#[derive(Clone)]
pub struct CancelHandle {
    ids: Arc<[ItemId]>,
    cancellers: Arc<Cancellers>,
}

impl CancelHandle {
    /// Cancel every item with this id. Returns whether any context fired.
    ///
    /// Under [`ContextPolicy::SharedDeadline`] items cannot be cancelled
    /// individually and this always returns `false`.
    pub fn cancel(&self, id: &str) -> bool {
        let mut fired = false;
        for (index, item) in self.ids.iter().enumerate() {
            if item == id {
                fired |= self.cancel_index(index);
            }
        }
        fired
    }

    /// Cancel the item at submission position `index`.
    pub fn cancel_index(&self, index: usize) -> bool {
        match &*self.cancellers {
            Cancellers::Shared(..) => false,
            Cancellers::PerItem(per_item) => per_item
                .get(index)
                .is_some_and(|canceller| canceller.cancel()),
        }
    }

    /// Cancel every context of the batch. Idempotent.
    pub fn cancel_all(&self) {
        match &*self.cancellers {
            Cancellers::Shared(_, canceller) => {
                canceller.cancel();
            }
            Cancellers::PerItem(per_item) => {
                for canceller in per_item {
                    canceller.cancel();
                }
            }
        }
    }

    /// The context handed to the item at `index`.
    pub fn context(&self, index: usize) -> Option<Context> {
        match &*self.cancellers {
            Cancellers::Shared(ctx, _) => (index < self.ids.len()).then(|| ctx.clone()),
            Cancellers::PerItem(per_item) => per_item.get(index).map(Canceller::context),
        }
    }
}

/// A dispatched batch awaiting collection.
pub struct Batch<T> {
    pub(crate) rx: mpsc::Receiver<WorkResult<T>>,
    pub(crate) ids: Arc<[ItemId]>,
    pub(crate) cancel: CancelHandle,
    pub(crate) started: Instant,
}

impl<T> Batch<T> {
    /// Number of items dispatched, which is also the number of results
    /// the batch will produce.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the batch was dispatched with no items.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Item ids in submission order.
    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    /// A handle for cancelling items while the batch is collected.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}
