/*!
    Caller-side cancellation of a playback session.
*/

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/**
    Cancels a running [`crate::play`] with a reason.

    Clones share the same state. Only the first reason is kept.
*/
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Request cancellation. Returns `false` if it was already cancelled.
    */
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let first = self.reason.set(reason.into()).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.get().cloned()
    }

    /// Resolves once [`CancelSignal::cancel`] has been called.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub(crate) fn reason_or_default(&self) -> String {
        self.reason().unwrap_or_else(|| "cancelled".to_owned())
    }
}
