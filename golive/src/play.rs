/*!
    The playback entry points.
*/

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use media_demux::{DemuxError, Demuxed, StreamEnd, demux};
use media_preview::PreviewRenderer;
use media_types::{MediaKind, VideoStreamInfo};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::error::PlayError;
use crate::guard::ResourceGuard;
use crate::options::{PlayOptions, StreamMode};
use crate::preview::{FrameRenderer, PreviewTap, spawn_preview};
use crate::sync::SyncState;
use crate::transport::{MediaChannel, Transport, VideoAttributes, VideoPacketizer};
use crate::writer::{AUDIO_FRAME, PacedWriter};

/**
    Stream `input` to `transport` until the video ends or `cancel` fires.

    # Errors

    - [`PlayError::NoActiveTransport`] before anything else is touched.
    - [`PlayError::Demux`] if the container cannot be opened or uses an
      unsupported codec.
    - [`PlayError::NoVideoStream`] for audio-only media.
    - [`PlayError::Cancelled`] with the reason given to [`CancelSignal::cancel`].
    - [`PlayError::StreamFailed`] if reading the video stream failed midway.
*/
pub async fn play<R>(
    input: R,
    transport: Arc<dyn Transport>,
    options: PlayOptions,
    cancel: CancelSignal,
) -> Result<(), PlayError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    check_ready(transport.as_ref(), &cancel)?;
    let options = options.normalized();
    debug!(?options, "starting playback");

    let demuxed = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(cancelled(&cancel)),
        demuxed = demux(input, options.demux.clone()) => demuxed?,
    };
    play_demuxed(demuxed, transport, options, cancel).await
}

/**
    Like [`play`], for streams that were already demuxed.
*/
pub async fn play_demuxed(
    demuxed: Demuxed,
    transport: Arc<dyn Transport>,
    options: PlayOptions,
    cancel: CancelSignal,
) -> Result<(), PlayError> {
    check_ready(transport.as_ref(), &cancel)?;
    let options = options.normalized();

    let Demuxed { video, audio } = demuxed;
    let Some(video) = video else {
        return Err(PlayError::NoVideoStream);
    };
    let packetizer = VideoPacketizer::for_codec(video.info.codec_id).ok_or_else(|| DemuxError::UnsupportedCodec {
        kind: MediaKind::Video,
        codec: video.info.codec_id.name().to_owned(),
    })?;
    let attributes = VideoAttributes {
        width: options.width.resolve(&video.info),
        height: options.height.resolve(&video.info),
        fps: options.frame_rate.resolve(&video.info),
    };

    let guard = ResourceGuard::new();
    let setup = async {
        let channel = open_channel(&transport, options.mode, &cancel, &guard).await?;
        channel.set_packetizer(packetizer);

        let ch = Arc::clone(&channel);
        acquire(
            async { channel.set_speaking(true).await.map_err(PlayError::from) },
            async move {
                if let Err(e) = ch.set_speaking(false).await {
                    warn!(error = %e, "failed to reset speaking state");
                }
            },
            &cancel,
            &guard,
        )
        .await?;

        let ch = Arc::clone(&channel);
        acquire(
            async { channel.set_video_attributes(Some(attributes)).await.map_err(PlayError::from) },
            async move {
                if let Err(e) = ch.set_video_attributes(None).await {
                    warn!(error = %e, "failed to clear video attributes");
                }
            },
            &cancel,
            &guard,
        )
        .await?;

        let tap = start_preview(&video.codec_config, &transport, &options, &guard).await;
        Ok::<_, PlayError>((channel, tap))
    };
    let (channel, tap) = match setup.await {
        Ok(session) => session,
        Err(e) => {
            guard.run().await;
            return Err(e);
        }
    };
    if cancel.is_cancelled() {
        guard.run().await;
        return Err(cancelled(&cancel));
    }

    let sync = Arc::new(SyncState::new(options.initial_burst));
    let audio_writer = audio.map(|track| {
        PacedWriter::new(
            MediaKind::Audio,
            track.packets,
            Arc::clone(&channel),
            AUDIO_FRAME,
            Arc::clone(&sync),
        )
    });
    let mut video_writer = PacedWriter::new(
        MediaKind::Video,
        video.packets,
        Arc::clone(&channel),
        frame_period(&video.info, attributes.fps),
        Arc::clone(&sync),
    )
    .with_preview(tap);
    if let Some(audio_writer) = &audio_writer {
        video_writer = video_writer.sync_to(audio_writer.clock(), options.sync_tolerance);
    }

    info!(
        mode = ?options.mode,
        codec = %video.info.codec_id,
        width = attributes.width,
        height = attributes.height,
        fps = attributes.fps,
        audio = audio_writer.is_some(),
        burst_ms = options.initial_burst.map(|b| b.as_millis() as u64),
        "streaming"
    );
    let audio_task = audio_writer.map(|writer| tokio::spawn(writer.run()));
    let mut video_task = tokio::spawn(video_writer.run());

    let finished = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        report = &mut video_task => Some(report),
    };
    video_task.abort();
    if let Some(task) = audio_task {
        task.abort();
    }

    let report = match finished {
        Some(Ok(report)) if !cancel.is_cancelled() => report,
        Some(Err(e)) if !cancel.is_cancelled() => {
            guard.run().await;
            return Err(PlayError::StreamFailed(format!("video writer stopped: {e}")));
        }
        _ => {
            guard.run().await;
            let e = cancelled(&cancel);
            info!(error = %e, "playback cancelled");
            return Err(e);
        }
    };
    guard.run().await;

    match report.end {
        Some(StreamEnd::Failed(reason)) => {
            warn!(sent = report.sent, %reason, "video stream ended with an error");
            Err(PlayError::StreamFailed(reason))
        }
        _ => {
            info!(sent = report.sent, "playback finished");
            Ok(())
        }
    }
}

fn check_ready(transport: &dyn Transport, cancel: &CancelSignal) -> Result<(), PlayError> {
    if cancel.is_cancelled() {
        return Err(cancelled(cancel));
    }
    if !transport.has_active_connection() {
        return Err(PlayError::NoActiveTransport);
    }
    Ok(())
}

fn cancelled(cancel: &CancelSignal) -> PlayError {
    PlayError::Cancelled {
        reason: cancel.reason_or_default(),
    }
}

/**
    Run one setup `step` unless `cancel` fires first, registering `undo` with
    the guard once it succeeded. A step interrupted by cancellation may
    already have taken effect on the other side, so `undo` is registered
    then too. Nothing is registered for a step that failed or never started.
*/
async fn acquire<T>(
    step: impl Future<Output = Result<T, PlayError>>,
    undo: impl Future<Output = ()> + Send + 'static,
    cancel: &CancelSignal,
    guard: &ResourceGuard,
) -> Result<T, PlayError> {
    if cancel.is_cancelled() {
        return Err(cancelled(cancel));
    }
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("cancelled during setup");
            Err(cancelled(cancel))
        }
        result = step => Ok(result?),
    };
    guard.defer(undo).await;
    result
}

async fn open_channel(
    transport: &Arc<dyn Transport>,
    mode: StreamMode,
    cancel: &CancelSignal,
    guard: &ResourceGuard,
) -> Result<Arc<dyn MediaChannel>, PlayError> {
    let t = Arc::clone(transport);
    match mode {
        StreamMode::GoLive => {
            acquire(
                async { transport.create_stream().await.map_err(PlayError::from) },
                async move { t.stop_stream().await },
                cancel,
                guard,
            )
            .await
        }
        StreamMode::Camera => {
            let channel = transport.media_channel().ok_or(PlayError::NoActiveTransport)?;
            acquire(
                async {
                    transport.signal_video(true).await;
                    Ok::<_, PlayError>(())
                },
                async move { t.signal_video(false).await },
                cancel,
                guard,
            )
            .await?;
            Ok(channel)
        }
    }
}

async fn start_preview(
    codec_config: &media_demux::CodecConfig,
    transport: &Arc<dyn Transport>,
    options: &PlayOptions,
    guard: &ResourceGuard,
) -> Option<PreviewTap> {
    if !options.preview {
        return None;
    }
    if options.mode != StreamMode::GoLive {
        debug!("stream previews are only sent in go-live mode");
        return None;
    }
    let renderer: Arc<dyn FrameRenderer> = match PreviewRenderer::new(codec_config, options.preview_config).await {
        Ok(renderer) => Arc::new(renderer),
        Err(e) => {
            warn!(error = %e, "failed to create preview decoder, previews disabled");
            return None;
        }
    };
    let (tap, task) = spawn_preview(Arc::clone(&renderer), Arc::clone(transport));
    guard
        .defer(async move {
            task.abort();
            renderer.close().await;
        })
        .await;
    Some(tap)
}

/**
    Frame time for video packets that carry no duration.
*/
fn frame_period(info: &VideoStreamInfo, fps: u32) -> Duration {
    info.frame_duration()
        .and_then(|ticks| info.time_base.to_duration(ticks))
        .filter(|d| !d.is_zero())
        .unwrap_or_else(|| Duration::from_secs_f64(1.0 / fps.max(1) as f64))
}
