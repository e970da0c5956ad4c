/*!
    Input byte feeding.

    A tokio task pulls chunks from the caller's reader into an [`InputBuffer`].
    The native container parser reads from that buffer on the engine thread
    through a blocking callback. The pump controls the feeder through an
    [`InputFeed`]: it pauses reading when an output channel is full and only
    submits read steps once enough bytes are buffered.
*/

use std::collections::VecDeque;
use std::os::raw::c_int;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use ffmpeg_next::ffi;
use parking_lot::{Condvar, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Size of a single upstream read.
const CHUNK_SIZE: usize = 64 * 1024;
/// Buffered bytes needed before a read step is submitted.
pub(crate) const READ_AHEAD: usize = 64 * 1024;
/// The feeder stops reading upstream above this many buffered bytes.
const HIGH_WATER: usize = 1024 * 1024;

#[derive(Default)]
struct BufferState {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    ended: bool,
    error: Option<String>,
    aborted: bool,
}

/**
    Bytes received from upstream and not yet consumed by the parser.
*/
#[derive(Default)]
pub(crate) struct InputBuffer {
    state: Mutex<BufferState>,
    arrived: Condvar,
    /// Wakes the pump waiting in [`InputFeed::ready`].
    readable: Notify,
    /// Wakes the feeder waiting for room below the high-water mark.
    room: Notify,
}

impl InputBuffer {
    fn push(&self, chunk: Bytes) {
        let mut state = self.state.lock();
        if state.aborted {
            return;
        }
        state.buffered += chunk.len();
        state.chunks.push_back(chunk);
        drop(state);
        self.arrived.notify_all();
        self.readable.notify_one();
    }

    fn finish(&self, error: Option<String>) {
        let mut state = self.state.lock();
        state.ended = true;
        state.error = error;
        drop(state);
        self.arrived.notify_all();
        self.readable.notify_one();
    }

    pub(crate) fn abort(&self) {
        self.state.lock().aborted = true;
        self.arrived.notify_all();
        self.readable.notify_one();
        self.room.notify_one();
    }

    fn is_ready(&self) -> bool {
        let state = self.state.lock();
        state.buffered >= READ_AHEAD || state.ended || state.aborted
    }

    fn has_room(&self) -> bool {
        let state = self.state.lock();
        state.buffered < HIGH_WATER || state.aborted
    }

    /**
        The upstream read error, if the input ended with one.
    */
    pub(crate) fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /**
        Fill `out` with buffered bytes, blocking until some arrive.

        Returns the byte count or an FFmpeg error code: `AVERROR_EOF` at the end
        of input, `AVERROR_EXTERNAL` if upstream failed, `AVERROR_EXIT` once the
        input was aborted.
    */
    pub(crate) fn read_blocking(&self, out: &mut [u8]) -> c_int {
        let mut state = self.state.lock();
        loop {
            if state.aborted {
                return ffi::AVERROR_EXIT;
            }
            if let Some(front) = state.chunks.front_mut() {
                let n = front.len().min(out.len());
                out[..n].copy_from_slice(&front[..n]);
                front.advance(n);
                if front.is_empty() {
                    state.chunks.pop_front();
                }
                state.buffered -= n;
                drop(state);
                self.room.notify_one();
                return n as c_int;
            }
            if state.ended {
                return match state.error {
                    Some(_) => ffi::AVERROR_EXTERNAL,
                    None => ffi::AVERROR_EOF,
                };
            }
            self.arrived.wait(&mut state);
        }
    }
}

/**
    The pump's handle on the input.

    Dropping it aborts the input: the feeder task stops and any blocked native
    read returns.
*/
pub(crate) struct InputFeed {
    buffer: Arc<InputBuffer>,
    paused: watch::Sender<bool>,
    cancel: CancellationToken,
    feeding: bool,
}

impl InputFeed {
    /**
        Start feeding `reader` into a new buffer.
    */
    pub(crate) fn spawn<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut feed = Self::detached();
        feed.feeding = true;
        tokio::spawn(feed_task(
            reader,
            Arc::clone(&feed.buffer),
            feed.paused.subscribe(),
            feed.cancel.clone(),
        ));
        feed
    }

    /**
        A feed without a feeder task, for sources that do not read through the
        buffer.
    */
    pub(crate) fn detached() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            buffer: Arc::new(InputBuffer::default()),
            paused,
            cancel: CancellationToken::new(),
            feeding: false,
        }
    }

    pub(crate) fn buffer(&self) -> Arc<InputBuffer> {
        Arc::clone(&self.buffer)
    }

    pub(crate) fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub(crate) fn resume(&self) {
        self.paused.send_replace(false);
    }

    #[cfg(test)]
    pub(crate) fn subscribe_paused(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    pub(crate) fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /**
        Stop the feeder and fail every pending or later native read with
        `AVERROR_EXIT`. Frees the engine thread from a read that waits for
        bytes which will never arrive.
    */
    pub(crate) fn abort(&self) {
        self.cancel.cancel();
        self.buffer.abort();
    }

    /**
        Wait until a read step would not have to block for long: enough bytes
        are buffered or the input has ended.

        A detached feed is always ready.
    */
    pub(crate) async fn ready(&self) {
        if !self.feeding {
            return;
        }
        while !self.buffer.is_ready() {
            self.buffer.readable.notified().await;
        }
    }
}

impl Drop for InputFeed {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn feed_task<R>(
    mut reader: R,
    buffer: Arc<InputBuffer>,
    mut paused: watch::Receiver<bool>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut total = 0usize;
    loop {
        while *paused.borrow_and_update() {
            trace!("input paused");
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = paused.changed() => if changed.is_err() { return },
            }
        }
        while !buffer.has_room() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = buffer.room.notified() => {}
            }
        }

        let mut chunk = BytesMut::with_capacity(CHUNK_SIZE);
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = reader.read_buf(&mut chunk) => read,
        };
        match read {
            Ok(0) => {
                debug!(bytes = total, "reached the end of input");
                buffer.finish(None);
                return;
            }
            Ok(n) => {
                total += n;
                trace!(bytes = n, "received input");
                buffer.push(chunk.freeze());
            }
            Err(e) => {
                warn!("input read failed: {e}");
                buffer.finish(Some(e.to_string()));
                return;
            }
        }
    }
}
