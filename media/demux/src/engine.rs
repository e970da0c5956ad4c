/*!
    The process-wide native engine.

    FFmpeg state is only ever touched from one dedicated thread. Work is
    submitted as closures into a FIFO queue and runs strictly one after the
    other, across every session in the process. A job that panics is reported
    to its submitter and the queue moves on.
*/

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, mpsc};
use std::thread;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::EngineError;

type Job = Box<dyn FnOnce() + Send + 'static>;

static LIVE_RESOURCES: AtomicUsize = AtomicUsize::new(0);

/**
    Returns the number of native resources currently alive.

    Counts open containers, filter chains, codec parameter copies and
    decoders. Intended as a leak probe.
*/
pub fn live_native_resources() -> usize {
    LIVE_RESOURCES.load(Ordering::SeqCst)
}

/**
    Marker held by every native resource wrapper, counted by
    [`live_native_resources`].
*/
#[derive(Debug)]
pub struct LiveResource(());

impl LiveResource {
    pub fn acquire() -> Self {
        LIVE_RESOURCES.fetch_add(1, Ordering::SeqCst);
        Self(())
    }
}

impl Drop for LiveResource {
    fn drop(&mut self) {
        LIVE_RESOURCES.fetch_sub(1, Ordering::SeqCst);
    }
}

/**
    Handle to the engine thread. Obtain it with [`engine`].
*/
pub struct Engine {
    jobs: mpsc::Sender<Job>,
}

/**
    Returns the engine, starting its thread on first use.
*/
pub fn engine() -> &'static Engine {
    static ENGINE: OnceLock<Engine> = OnceLock::new();
    ENGINE.get_or_init(Engine::start)
}

impl Engine {
    fn start() -> Self {
        let (jobs, queue) = mpsc::channel::<Job>();
        let spawned = thread::Builder::new()
            .name("media-engine".into())
            .spawn(move || {
                if let Err(e) = ffmpeg_next::init() {
                    error!("ffmpeg initialization failed: {e}");
                }
                debug!("media engine started");
                while let Ok(job) = queue.recv() {
                    job();
                }
            });
        if let Err(e) = spawned {
            error!("failed to start media engine thread: {e}");
        }
        Self { jobs }
    }

    /**
        Queue `op` on the engine thread and return a future for its result.

        The job takes its place in the queue when `submit` is called, not when
        the future is first polled. If the future is dropped early the job still
        runs and its result is dropped on the engine thread.
    */
    pub fn submit<F, T>(&self, op: F) -> impl Future<Output = Result<T, EngineError>> + Send + 'static
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(op)).map_err(panic_message);
            // Receiver gone means the caller stopped waiting.
            let _ = tx.send(result);
        });
        let queued = self.jobs.send(job).map_err(|_| EngineError::Stopped);

        async move {
            queued?;
            match rx.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(EngineError::Panicked(message)),
                Err(_) => Err(EngineError::Stopped),
            }
        }
    }

    /**
        Queue `op` without waiting for it. Used to release native state from
        `Drop` implementations.
    */
    pub fn execute<F>(&self, op: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(op)) {
                warn!("media engine job panicked: {}", panic_message(payload));
            }
        });
        if self.jobs.send(job).is_err() {
            warn!("media engine is not running, job dropped");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/**
    Native state that lives on the engine thread.

    The value is only accessed inside engine jobs and is dropped there exactly
    once, either through [`EngineCell::release`] or when the last handle goes
    away.
*/
pub struct EngineCell<T: Send + 'static> {
    value: Arc<Mutex<Option<T>>>,
}

impl<T: Send + 'static> EngineCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(Mutex::new(Some(value))),
        }
    }

    /**
        Run `op` against the value on the engine thread.

        Returns `Ok(None)` once the value has been released.
    */
    pub async fn with<F, R>(&self, op: F) -> Result<Option<R>, EngineError>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let value = Arc::clone(&self.value);
        engine()
            .submit(move || value.lock().as_mut().map(op))
            .await
    }

    /**
        Drop the value on the engine thread and wait until it is gone.
    */
    pub async fn release(&self) -> Result<(), EngineError> {
        let value = Arc::clone(&self.value);
        engine().submit(move || drop(value.lock().take())).await
    }
}

impl<T: Send + 'static> Drop for EngineCell<T> {
    fn drop(&mut self) {
        let value = Arc::clone(&self.value);
        engine().execute(move || drop(value.lock().take()));
    }
}
