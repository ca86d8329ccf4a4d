use std::{future::Future, time::Duration};

use tokio::{task::AbortHandle, time::sleep};

/// Handle to work scheduled with [`schedule`].
///
/// Dropping the handle does not cancel the work.
#[derive(Debug)]
pub struct DeferredAction {
    task: AbortHandle,
}

impl DeferredAction {
    /// Stop the action if it has not run yet. No-op once it has finished.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the action ran to completion or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Run `action` once `delay` has elapsed.
pub fn schedule<F>(delay: Duration, action: F) -> DeferredAction
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        sleep(delay).await;
        action.await;
    });
    DeferredAction {
        task: task.abort_handle(),
    }
}
