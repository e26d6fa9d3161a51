//! Hierarchical cancellation context.
//!
//! A [`Context`] carries a done-signal that fires at most once and never
//! resets, an optional deadline, and the reason it fired. Children derived
//! with [`Context::with_cancel`], [`Context::with_deadline`] or
//! [`Context::with_timeout`] fire when their parent fires and inherit the
//! earlier of the two deadlines.
//!
//! Deadlines are evaluated when the context is observed, so no timer task is
//! spawned per context. The [`Canceller`] returned alongside every derived
//! context releases it: explicitly through [`Canceller::cancel`], or on drop.

use futures_util::future::select_all;
use std::{fmt, future::pending, sync::Arc};
use tokio::{
    sync::watch,
    time::{self, Duration, Instant},
};

/// Why a context fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The context, or one of its ancestors, was cancelled explicitly.
    #[error("context canceled")]
    Canceled,
    /// The context's deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal shared by the tasks of a batch.
///
/// Cloning is cheap; all clones observe the same signal.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<Option<ContextError>>,
    deadline: Option<Instant>,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn root() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state,
            deadline: None,
            parent: None,
        }
    }

    /// Resolve the terminal state, recording inherited or expired reasons.
    fn err(&self) -> Option<ContextError> {
        let current = *self.state.borrow();
        if current.is_some() {
            return current;
        }
        let reason = self.pending_reason()?;
        self.record(reason);
        *self.state.borrow()
    }

    /// A reason that holds now but has not been recorded yet.
    fn pending_reason(&self) -> Option<ContextError> {
        let inherited = self.parent.as_ref().and_then(|parent| parent.err());
        let expired = self
            .deadline
            .filter(|deadline| *deadline <= Instant::now())
            .map(|_| ContextError::DeadlineExceeded);
        inherited.or(expired)
    }

    /// Record `reason` unless the signal already fired. Returns whether
    /// this call fired it.
    fn record(&self, reason: ContextError) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(reason);
            true
        })
    }

    fn cancel(&self) -> bool {
        let reason = self.pending_reason().unwrap_or(ContextError::Canceled);
        self.record(reason)
    }
}

impl Context {
    /// A root context that never fires.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner::root()),
        }
    }

    /// Derive a child that fires when cancelled or when `parent` fires.
    pub fn with_cancel(parent: &Context) -> (Context, Canceller) {
        Self::derive(parent, None)
    }

    /// Derive a child that also fires at `deadline`.
    pub fn with_deadline(parent: &Context, deadline: Instant) -> (Context, Canceller) {
        Self::derive(parent, Some(deadline))
    }

    /// Derive a child that also fires once `timeout` has elapsed from now.
    pub fn with_timeout(parent: &Context, timeout: Duration) -> (Context, Canceller) {
        Self::derive(parent, Some(Instant::now() + timeout))
    }

    fn derive(parent: &Context, deadline: Option<Instant>) -> (Context, Canceller) {
        let deadline = match (parent.deadline(), deadline) {
            (Some(inherited), Some(own)) => Some(inherited.min(own)),
            (inherited, own) => inherited.or(own),
        };
        let (state, _) = watch::channel(None);
        let inner = Arc::new(Inner {
            state,
            deadline,
            parent: Some(Arc::clone(&parent.inner)),
        });
        let canceller = Canceller {
            inner: Arc::clone(&inner),
        };
        (Context { inner }, canceller)
    }

    /// The effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why the context fired, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        self.inner.err()
    }

    /// Whether the done-signal has fired.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Wait until the context fires and return the reason.
    ///
    /// Resolves immediately if it already fired.
    pub async fn done(&self) -> ContextError {
        let mut chain = Vec::new();
        let mut next = Some(&self.inner);
        while let Some(inner) = next {
            chain.push(inner.state.subscribe());
            next = inner.parent.as_ref();
        }

        loop {
            if let Some(reason) = self.err() {
                return reason;
            }

            let signals = select_all(chain.iter_mut().map(|rx| {
                Box::pin(async move {
                    let closed = rx.wait_for(Option::is_some).await.is_err();
                    if closed {
                        pending::<()>().await;
                    }
                })
            }));
            let deadline = async {
                match self.inner.deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => pending().await,
                }
            };

            tokio::select! {
                _ = signals => {}
                _ = deadline => {}
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish()
    }
}

/// Release handle for a derived [`Context`].
///
/// Cancelling is idempotent. Dropping the handle cancels the context, so
/// the context is released on every exit path.
pub struct Canceller {
    inner: Arc<Inner>,
}

impl Canceller {
    /// Fire the context. Returns `true` only for the call that fired it.
    ///
    /// When the deadline or an ancestor has already fired, that reason is
    /// recorded instead of [`ContextError::Canceled`].
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    /// A handle on the context this canceller releases.
    pub fn context(&self) -> Context {
        Context {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for Canceller {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller")
            .field("err", &self.inner.err())
            .finish()
    }
}
