//! One-shot dispatch.
//!
//! Every persistence call, against the ephemeral store or the durable user
//! store, runs as its own Tokio task and reports back through a fresh
//! single-use channel. The caller only suspends when it receives.
//!
//! A completion is not a reusable future: each call allocates a new channel
//! and spawns a new task, and exactly one `Result` travels through it.

use std::future::Future;

use thiserror::Error;
use tokio::sync::oneshot;

/// The dispatched task ended (it panicked, or the result was already taken)
/// without a result reaching the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("dispatched operation ended without delivering a result")]
pub struct Undelivered;

/// Receiving end of a dispatched operation
///
/// Dropping it does not cancel the operation; the task still runs to
/// completion and its result is discarded.
#[must_use = "the operation's result is lost unless it is received"]
#[derive(Debug)]
pub struct Completion<T, E> {
    rx: Option<oneshot::Receiver<Result<T, E>>>,
}

/// Runs `operation` exactly once on its own task
///
/// The channel is allocated before the task starts. The task delivers the
/// operation's value or its error, never both, and then terminates.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime context.
pub fn dispatch<T, E, F>(operation: F) -> Completion<T, E>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let outcome = operation.await;
        // `send` consumes the sender, so this is the only delivery
        if tx.send(outcome).is_err() {
            tracing::trace!("completion dropped before its result was delivered");
        }
    });

    Completion { rx: Some(rx) }
}

impl<T, E> Completion<T, E> {
    /// Takes the result if it has already arrived
    ///
    /// Returns `None` while the operation is still running, and forever
    /// after the result has been taken once.
    pub fn try_recv(&mut self) -> Option<Result<T, E>> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(outcome) => {
                self.rx = None;
                Some(outcome)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                None
            }
        }
    }
}

impl<T, E> Completion<T, E>
where
    E: From<Undelivered>,
{
    /// Waits for the single result of the operation
    ///
    /// Errors produced by the operation come back untouched. `Undelivered`
    /// is returned only if the task died without sending, or the result was
    /// already taken with [`Completion::try_recv`].
    pub async fn wait(self) -> Result<T, E> {
        match self.rx {
            Some(rx) => rx.await.unwrap_or_else(|_| Err(Undelivered.into())),
            None => Err(Undelivered.into()),
        }
    }
}
