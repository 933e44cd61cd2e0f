use std::sync::Arc;

/// A one-to-one callback registered by an upstream stage so that a
/// downstream queue can wake it once capacity frees up. Per §4.6, two
/// wirings exist in the engine: SenderQueue -> ProcessQueue, and
/// ProcessQueue -> the reader scheduler. Both are instances of this same
/// type; `harvest-queue` does not need to know which.
#[derive(Clone)]
pub struct FeedbackInterface {
    notify: Arc<dyn Fn() + Send + Sync>,
}

impl FeedbackInterface {
    pub fn new(notify: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            notify: Arc::new(notify),
        }
    }

    pub fn notify(&self) {
        (self.notify)();
    }
}

impl std::fmt::Debug for FeedbackInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackInterface").finish_non_exhaustive()
    }
}
