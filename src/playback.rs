//! Audio playback: decode-and-play behind a handle with a strict lifecycle.
//!
//! The controller owns an [`AudioSink`] (the platform decode/play primitive)
//! and guarantees at most one live handle: a new `play` stops the previous
//! handle before the new one exists. `Started` fires when audio output
//! actually begins, not at request time. `Ended` fires only on natural
//! completion — never as a consequence of an explicit `stop`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Encoded audio produced by the synthesis collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    /// Encoded bytes as returned by the synthesizer.
    pub bytes: Vec<u8>,
    /// MIME type of the encoding (e.g. `audio/pcm;rate=24000`).
    pub mime_type: String,
}

/// Lifecycle events reported by an [`AudioSink`] for one play call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// Audio output has actually begun.
    Started,
    /// Playback ran to natural completion. Not sent on cancellation.
    Ended,
}

/// Platform seam: decodes encoded audio and plays it on the output device.
///
/// Implementations send [`SinkEvent::Started`] once output begins and
/// [`SinkEvent::Ended`] once on natural completion, and honor `cancel`
/// cooperatively by ending output without sending `Ended`.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(
        &self,
        audio: EncodedAudio,
        events: mpsc::UnboundedSender<SinkEvent>,
        cancel: CancellationToken,
    );
}

/// Opaque identifier for one playback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(u64);

/// Events emitted by the playback controller, tagged with their handle so a
/// consumer can discard events from superseded playbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Audio output began for this handle.
    Started(PlaybackHandle),
    /// This handle's playback completed naturally.
    Ended(PlaybackHandle),
}

struct LivePlayback {
    handle: PlaybackHandle,
    cancel: CancellationToken,
    /// Set on explicit stop so a racing natural `Ended` from the sink task
    /// is filtered out.
    stopped: Arc<AtomicBool>,
}

/// Drives an [`AudioSink`] with the at-most-one-live-handle invariant.
pub struct PlaybackController {
    sink: Arc<dyn AudioSink>,
    events_tx: mpsc::UnboundedSender<PlaybackEvent>,
    live: Option<LivePlayback>,
    next_id: u64,
}

impl PlaybackController {
    /// Create a controller that reports playback events on `events_tx`.
    pub fn new(
        sink: Arc<dyn AudioSink>,
        events_tx: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Self {
        Self {
            sink,
            events_tx,
            live: None,
            next_id: 0,
        }
    }

    /// The currently live handle, if playback is in progress.
    pub fn live_handle(&self) -> Option<PlaybackHandle> {
        self.live.as_ref().map(|l| l.handle)
    }

    /// Start playing `audio`, preempting any playback still in progress.
    ///
    /// The previous handle (if any) is stopped before the new handle is
    /// created, so no two handles are ever live at once.
    pub fn play(&mut self, audio: EncodedAudio) -> PlaybackHandle {
        if let Some(handle) = self.live_handle() {
            self.stop(handle);
        }

        self.next_id += 1;
        let handle = PlaybackHandle(self.next_id);
        let cancel = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));
        self.live = Some(LivePlayback {
            handle,
            cancel: cancel.clone(),
            stopped: Arc::clone(&stopped),
        });

        let sink = Arc::clone(&self.sink);
        let events_tx = self.events_tx.clone();
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<SinkEvent>();

        tokio::spawn(async move {
            sink.play(audio, sink_tx, cancel).await;
        });

        // Forward sink events under this handle, dropping anything the sink
        // emits after an explicit stop.
        tokio::spawn(async move {
            while let Some(ev) = sink_rx.recv().await {
                if stopped.load(Ordering::Acquire) {
                    debug!("dropping {ev:?} from stopped playback {handle:?}");
                    continue;
                }
                let forwarded = match ev {
                    SinkEvent::Started => PlaybackEvent::Started(handle),
                    SinkEvent::Ended => PlaybackEvent::Ended(handle),
                };
                if events_tx.send(forwarded).is_err() {
                    break;
                }
            }
        });

        handle
    }

    /// Stop playback for `handle`. Safe to call on an already-stopped or
    /// already-ended handle; such calls are silently ignored.
    pub fn stop(&mut self, handle: PlaybackHandle) {
        let Some(live) = &self.live else {
            return;
        };
        if live.handle != handle {
            return;
        }
        let Some(live) = self.live.take() else {
            return;
        };
        live.stopped.store(true, Ordering::Release);
        live.cancel.cancel();
    }

    /// Stop whatever is playing, if anything. Idempotent.
    pub fn stop_current(&mut self) {
        if let Some(handle) = self.live_handle() {
            self.stop(handle);
        }
    }

    /// Mark `handle` as no longer live after its natural `Ended` event.
    ///
    /// The turn controller calls this when it consumes an `Ended` so a later
    /// `stop` on the same handle stays a no-op.
    pub fn on_ended(&mut self, handle: PlaybackHandle) {
        if self.live_handle() == Some(handle) {
            self.live = None;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::time::Duration;

    /// Sink that "plays" for a fixed duration, honoring cancellation.
    struct TimedSink {
        duration: Duration,
    }

    #[async_trait]
    impl AudioSink for TimedSink {
        async fn play(
            &self,
            _audio: EncodedAudio,
            events: mpsc::UnboundedSender<SinkEvent>,
            cancel: CancellationToken,
        ) {
            let _ = events.send(SinkEvent::Started);
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(self.duration) => {
                    let _ = events.send(SinkEvent::Ended);
                }
            }
        }
    }

    /// Sink that ignores cancellation and always reports a natural end, to
    /// exercise the stopped-handle filter.
    struct UnrulySink;

    #[async_trait]
    impl AudioSink for UnrulySink {
        async fn play(
            &self,
            _audio: EncodedAudio,
            events: mpsc::UnboundedSender<SinkEvent>,
            _cancel: CancellationToken,
        ) {
            let _ = events.send(SinkEvent::Started);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = events.send(SinkEvent::Ended);
        }
    }

    fn audio() -> EncodedAudio {
        EncodedAudio {
            bytes: vec![0, 1, 2, 3],
            mime_type: "audio/pcm;rate=24000".to_owned(),
        }
    }

    async fn recv_timeout(
        rx: &mut mpsc::UnboundedReceiver<PlaybackEvent>,
    ) -> Option<PlaybackEvent> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn natural_completion_reports_started_then_ended() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut playback = PlaybackController::new(
            Arc::new(TimedSink {
                duration: Duration::from_millis(10),
            }),
            tx,
        );

        let handle = playback.play(audio());
        assert_eq!(recv_timeout(&mut rx).await, Some(PlaybackEvent::Started(handle)));
        assert_eq!(recv_timeout(&mut rx).await, Some(PlaybackEvent::Ended(handle)));
    }

    #[tokio::test]
    async fn stop_suppresses_ended() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut playback = PlaybackController::new(
            Arc::new(TimedSink {
                duration: Duration::from_secs(60),
            }),
            tx,
        );

        let handle = playback.play(audio());
        assert_eq!(recv_timeout(&mut rx).await, Some(PlaybackEvent::Started(handle)));
        playback.stop(handle);
        assert!(playback.live_handle().is_none());
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn stop_filters_ended_from_uncooperative_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut playback = PlaybackController::new(Arc::new(UnrulySink), tx);

        let handle = playback.play(audio());
        assert_eq!(recv_timeout(&mut rx).await, Some(PlaybackEvent::Started(handle)));
        playback.stop(handle);
        // The sink sends Ended anyway; the forwarder must drop it.
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn new_play_preempts_previous_handle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut playback = PlaybackController::new(
            Arc::new(TimedSink {
                duration: Duration::from_secs(60),
            }),
            tx,
        );

        let first = playback.play(audio());
        assert_eq!(recv_timeout(&mut rx).await, Some(PlaybackEvent::Started(first)));
        let second = playback.play(audio());
        assert_ne!(first, second);
        assert_eq!(playback.live_handle(), Some(second));
        // The only further event is the second handle starting; the first
        // handle was stopped, so it never ends naturally.
        assert_eq!(recv_timeout(&mut rx).await, Some(PlaybackEvent::Started(second)));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_ignores_stale_handles() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut playback = PlaybackController::new(
            Arc::new(TimedSink {
                duration: Duration::from_millis(10),
            }),
            tx,
        );

        let handle = playback.play(audio());
        assert_eq!(recv_timeout(&mut rx).await, Some(PlaybackEvent::Started(handle)));
        assert_eq!(recv_timeout(&mut rx).await, Some(PlaybackEvent::Ended(handle)));
        playback.on_ended(handle);

        // Stopping an already-ended handle changes nothing.
        playback.stop(handle);
        playback.stop(handle);
        playback.stop_current();
        assert!(playback.live_handle().is_none());
    }
}
