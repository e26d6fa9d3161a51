//! Concurrent fan-out dispatcher.
//!
//! A [`Dispatcher`] launches one tokio task per [`WorkItem`], every task
//! racing its [`Operation`] against a cancellation [`Context`] and posting
//! exactly one [`WorkResult`] onto a shared channel. The returned [`Batch`]
//! is drained by [`Batch::collect`] under a [`CollectPolicy`].
//!
//! # Example
//!
//! ```rust,ignore
//! use fanout::{CollectPolicy, ContextPolicy, Dispatcher, Simulated, WorkItem};
//! use std::time::Duration;
//!
//! let dispatcher = Dispatcher::new(Simulated::default());
//! let items = (0..6).map(|i| WorkItem::url(format!("http://example.com/{i}")));
//! let policy = ContextPolicy::SharedDeadline(Duration::from_millis(100));
//! let batch = dispatcher.dispatch(items, policy);
//! let collected = batch.collect(CollectPolicy::DrainAll).await;
//! println!("{}", collected.summary());
//! ```

pub use collect::{CollectPolicy, Collected};
pub use context::{Canceller, Context, ContextError};
pub use dispatch::{Batch, CancelHandle, ChannelCapacity, ContextPolicy, Dispatcher};
pub use item::{ItemId, WorkItem};
pub use operation::{FromFn, Operation, from_fn};
pub use result::{OutcomeKind, WorkError, WorkResult};
pub use simulate::{Response, Simulated};
pub use summary::Summary;

pub mod collect;
pub mod context;
pub mod dispatch;
pub mod item;
pub mod operation;
pub mod result;
pub mod simulate;
pub mod summary;
mod worker;
