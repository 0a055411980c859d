//! Panic boundaries that stay cancellable.

use std::future::Future;

use tokio::task::{AbortHandle, JoinError};

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run `future` on its own task and wait for it.
///
/// A panic inside `future` comes back as `Err(JoinError)` instead of unwinding into
/// the caller. Dropping the returned future aborts the task, so cancelling the caller
/// also cancels the work it was waiting on.
pub async fn run_isolated<F>(future: F) -> Result<F::Output, JoinError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = tokio::spawn(future);
    let _guard = AbortOnDrop(handle.abort_handle());
    handle.await
}
