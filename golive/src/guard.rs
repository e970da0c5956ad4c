/*!
    One-shot cleanup of everything a playback session acquired.
*/

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

type Cleanup = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
struct GuardState {
    ran: bool,
    actions: Vec<Cleanup>,
}

/**
    Ordered list of cleanup actions, run at most once.

    Actions run in registration order. Whichever of completion or cancellation
    calls [`ResourceGuard::run`] first does the work; later calls wait for it
    to finish and return.
*/
#[derive(Default)]
pub struct ResourceGuard {
    state: Mutex<GuardState>,
    has_run: AtomicBool,
}

impl ResourceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Register a cleanup action.

        If the guard has already run, the action is executed right away so
        that a resource acquired late is still released.
    */
    pub async fn defer<F>(&self, cleanup: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock().await;
        if state.ran {
            drop(state);
            debug!("guard already ran, releasing late resource");
            cleanup.await;
        } else {
            state.actions.push(Box::pin(cleanup));
        }
    }

    /**
        Run every registered action. Returns `false` if the guard had already
        run.
    */
    pub async fn run(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.ran {
            return false;
        }
        state.ran = true;
        self.has_run.store(true, Ordering::Release);

        let actions = std::mem::take(&mut state.actions);
        debug!(count = actions.len(), "running cleanup");
        for action in actions {
            action.await;
        }
        true
    }

    pub fn has_run(&self) -> bool {
        self.has_run.load(Ordering::Acquire)
    }
}
