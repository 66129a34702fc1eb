//! Event lifetime extension.
//!
//! A handler may finish its response before all of its work is done (a
//! background revalidation, for instance). Such work is registered through
//! [`ExtendableEvent::wait_until`] and the host awaits
//! [`ExtendableEvent::settled`] before it considers the event finished or
//! shuts down.

use std::future::Future;

use tokio_util::task::TaskTracker;

#[derive(Debug, Clone)]
pub struct ExtendableEvent {
    tracker: TaskTracker,
}

impl Default for ExtendableEvent {
    fn default() -> Self {
        Self { tracker: TaskTracker::new() }
    }
}

impl ExtendableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the event alive until `work` completes.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(work);
    }

    /// Number of registered futures still running.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every registered future.
    ///
    /// Work registered while waiting, e.g. by a registered future itself,
    /// is waited for as well.
    pub async fn settled(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
