/*!
    The demuxer pump.

    One task per demuxer reads the container one packet at a time on the
    engine thread, routes each packet to its channel and applies backpressure.
    Packets a full channel refuses are kept in order in a per-channel backlog
    and input is paused until every backlog has drained. Drain notifications
    only wake this single task, so repeated triggers never start a second run.
*/

use std::collections::VecDeque;

use media_types::{MediaKind, Packet};
use tracing::{debug, info, trace, warn};

use crate::channel::{Offer, PacketSender, StreamEnd};
use crate::engine::EngineCell;
use crate::input::InputFeed;
use crate::opus;

/**
    Outcome of one native read.
*/
pub(crate) enum Read<P> {
    Packet(P),
    /// Nothing available yet.
    Again,
    End,
    Failed(String),
}

/**
    A container packet producer driven by the pump.

    Every method runs on the engine thread.
*/
pub(crate) trait PacketSource: Send + 'static {
    type Raw;

    fn read_packet(&mut self) -> Read<Self::Raw>;

    fn stream_index(&self, raw: &Self::Raw) -> usize;

    /// Run a video packet through the filter chain.
    fn filter_video(&mut self, raw: Self::Raw, out: &mut Vec<Packet>) -> Result<(), String>;

    fn copy_audio(&mut self, raw: Self::Raw) -> Packet;

    /// Flush the filter chain at the end of the stream.
    fn finish_video(&mut self, out: &mut Vec<Packet>) -> Result<(), String>;
}

/**
    Container indices of the tracked streams.
*/
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Tracks {
    pub video: Option<usize>,
    pub audio: Option<usize>,
}

#[derive(Default)]
pub(crate) struct Step {
    video: Vec<Packet>,
    audio: Vec<Packet>,
    end: Option<StreamEnd>,
}

/**
    Read and route one packet. Runs on the engine thread.
*/
pub(crate) fn read_step<S: PacketSource>(source: &mut S, tracks: Tracks) -> Step {
    let mut step = Step::default();
    match source.read_packet() {
        Read::Packet(raw) => {
            let index = source.stream_index(&raw);
            if Some(index) == tracks.video {
                if let Err(reason) = source.filter_video(raw, &mut step.video) {
                    warn!("video filtering failed: {reason}");
                    step.end = Some(StreamEnd::Failed(reason));
                }
            } else if Some(index) == tracks.audio {
                let mut packet = source.copy_audio(raw);
                infer_duration(&mut packet);
                step.audio.push(packet);
            }
            // Packets of untracked streams are released here.
        }
        Read::Again => {}
        Read::End => {
            info!("reached end of stream");
            step.end = Some(match source.finish_video(&mut step.video) {
                Ok(()) => StreamEnd::Finished,
                Err(reason) => StreamEnd::Failed(reason),
            });
        }
        Read::Failed(reason) => {
            warn!("packet extraction failed, stopping: {reason}");
            if let Err(e) = source.finish_video(&mut step.video) {
                debug!("filter flush after failure also failed: {e}");
            }
            step.end = Some(StreamEnd::Failed(reason));
        }
    }
    step
}

fn infer_duration(packet: &mut Packet) {
    if packet.duration.is_none() {
        packet.duration =
            opus::packet_duration(&packet.data, packet.time_base).filter(|d| *d > 0);
    }
}

struct Output {
    kind: MediaKind,
    sender: PacketSender,
    backlog: VecDeque<Packet>,
}

impl Output {
    fn new(kind: MediaKind, sender: PacketSender) -> Self {
        Self {
            kind,
            sender,
            backlog: VecDeque::new(),
        }
    }

    /**
        Offer the backlog in order. Returns false if the channel filled up.
    */
    fn flush(&mut self) -> bool {
        while let Some(packet) = self.backlog.pop_front() {
            match self.sender.offer(packet) {
                Offer::Accepted => {}
                Offer::Full(packet) => {
                    trace!(kind = %self.kind, "channel full");
                    self.backlog.push_front(packet);
                    return false;
                }
                Offer::Disconnected => {
                    self.backlog.clear();
                    return true;
                }
            }
        }
        true
    }
}

fn flush_all(outputs: &mut [Output]) -> bool {
    let mut delivered = true;
    for output in outputs.iter_mut() {
        delivered &= output.flush();
    }
    delivered
}

async fn wait_for_room(outputs: &[Output]) {
    for output in outputs.iter().filter(|o| !o.backlog.is_empty()) {
        output.sender.wait_capacity().await;
    }
}

async fn all_closed(outputs: &[Output]) {
    for output in outputs {
        output.sender.closed().await;
    }
}

/**
    Drive `source` until the end of the stream or until every consumer is
    gone, then close the channels and release the native state.
*/
pub(crate) async fn run<S: PacketSource>(
    source: EngineCell<S>,
    tracks: Tracks,
    feed: InputFeed,
    video: Option<PacketSender>,
    audio: Option<PacketSender>,
) {
    let mut outputs: Vec<Output> = video
        .map(|tx| Output::new(MediaKind::Video, tx))
        .into_iter()
        .chain(audio.map(|tx| Output::new(MediaKind::Audio, tx)))
        .collect();

    let end = loop {
        if outputs.iter().all(|o| o.sender.is_disconnected()) {
            debug!("every consumer is gone, stopping");
            break None;
        }
        if !flush_all(&mut outputs) {
            if !feed.is_paused() {
                feed.pause();
                trace!("input paused");
            }
            wait_for_room(&outputs).await;
            continue;
        }
        if feed.is_paused() {
            feed.resume();
            trace!("input resumed");
        }

        tokio::select! {
            _ = feed.ready() => {}
            // Checked again at the top of the loop.
            _ = all_closed(&outputs) => continue,
        }

        // A read can block the engine thread on input that never arrives.
        // Once every consumer is gone the input is aborted to release it.
        let read = source.with(move |s| read_step(s, tracks));
        tokio::pin!(read);
        let mut aborted = false;
        let result = loop {
            tokio::select! {
                result = &mut read => break result,
                _ = all_closed(&outputs), if !aborted => {
                    debug!("every consumer is gone during a read, aborting input");
                    feed.abort();
                    aborted = true;
                }
            }
        };
        let mut step = match result {
            Ok(Some(step)) => step,
            Ok(None) => break Some(StreamEnd::Failed("demuxer state was released".into())),
            Err(e) => break Some(StreamEnd::Failed(e.to_string())),
        };
        for output in &mut outputs {
            let packets = match output.kind {
                MediaKind::Video => &mut step.video,
                MediaKind::Audio => &mut step.audio,
            };
            output.backlog.extend(packets.drain(..));
        }
        if let Some(end) = step.end {
            break Some(end);
        }
    };

    if let Some(end) = end {
        while !flush_all(&mut outputs) {
            wait_for_room(&outputs).await;
        }
        for output in &outputs {
            output.sender.close(end.clone());
        }
        match &end {
            StreamEnd::Finished => debug!("demuxer finished"),
            StreamEnd::Failed(reason) => warn!("demuxer ended with an error: {reason}"),
        }
    }

    if let Err(e) = source.release().await {
        warn!("failed to release demuxer state: {e}");
    }
    drop(feed);
}
