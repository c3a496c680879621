//! Speech capture: a thin adapter over the platform's one-shot recognizer.
//!
//! The adapter owns a [`SpeechRecognizer`] and turns its single-shot
//! recognize call into an event stream: a listening-state change when the
//! session opens and closes, then exactly one terminal event — an utterance
//! or a capture error. The recognizer runs in non-continuous mode with no
//! interim results, in the locale fixed at construction time.

use crate::error::CaptureError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Platform seam: a one-shot speech recognition primitive.
///
/// `recognize_once` opens the microphone, waits for a single utterance, and
/// resolves with its transcript. The future is dropped on cooperative stop;
/// implementations must tolerate that.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize_once(&self) -> std::result::Result<String, CaptureError>;
}

/// Events emitted by the capture adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// The adapter started or stopped listening.
    ListeningChanged(bool),
    /// Terminal: the recognizer produced a transcript.
    Utterance(String),
    /// Terminal: the recognition session failed.
    Failed(CaptureError),
}

/// Wraps a [`SpeechRecognizer`] with idempotent start/stop and an event
/// channel. At most one recognition session is active at a time.
pub struct CaptureAdapter {
    recognizer: Arc<dyn SpeechRecognizer>,
    events_tx: mpsc::UnboundedSender<CaptureEvent>,
    listening: Arc<AtomicBool>,
    session_cancel: Option<CancellationToken>,
}

impl CaptureAdapter {
    /// Create an adapter that reports capture events on `events_tx`.
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        events_tx: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Self {
        Self {
            recognizer,
            events_tx,
            listening: Arc::new(AtomicBool::new(false)),
            session_cancel: None,
        }
    }

    /// Whether a recognition session is currently open.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Begin a one-shot recognition session.
    ///
    /// Returns true if a new session opened. No-op (returning false) if
    /// already listening; a start that races a previous session's teardown
    /// is swallowed the same way — the underlying "already started"
    /// condition never propagates to the caller.
    pub fn start_listening(&mut self) -> bool {
        if self.listening.swap(true, Ordering::AcqRel) {
            debug!("start_listening ignored: session already active");
            return false;
        }

        let cancel = CancellationToken::new();
        self.session_cancel = Some(cancel.clone());

        let recognizer = Arc::clone(&self.recognizer);
        let events_tx = self.events_tx.clone();
        let listening = Arc::clone(&self.listening);

        let _ = events_tx.send(CaptureEvent::ListeningChanged(true));

        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    // Cooperative stop: the session ends with no terminal
                    // utterance or error.
                    listening.store(false, Ordering::Release);
                    let _ = events_tx.send(CaptureEvent::ListeningChanged(false));
                }
                result = recognizer.recognize_once() => {
                    listening.store(false, Ordering::Release);
                    let _ = events_tx.send(CaptureEvent::ListeningChanged(false));
                    match result {
                        Ok(transcript) => {
                            let _ = events_tx.send(CaptureEvent::Utterance(transcript));
                        }
                        Err(e) => {
                            warn!("speech recognition failed: {e}");
                            let _ = events_tx.send(CaptureEvent::Failed(e));
                        }
                    }
                }
            }
        });
        true
    }

    /// Stop the active recognition session, if any. Idempotent.
    pub fn stop_listening(&mut self) {
        if let Some(cancel) = self.session_cancel.take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Recognizer that resolves with a fixed transcript after a short delay.
    struct ScriptedRecognizer {
        transcript: &'static str,
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechRecognizer for ScriptedRecognizer {
        async fn recognize_once(&self) -> std::result::Result<String, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.transcript.to_owned())
        }
    }

    struct FailingRecognizer(CaptureError);

    #[async_trait]
    impl SpeechRecognizer for FailingRecognizer {
        async fn recognize_once(&self) -> std::result::Result<String, CaptureError> {
            Err(self.0)
        }
    }

    async fn drain_until_terminal(rx: &mut mpsc::UnboundedReceiver<CaptureEvent>) -> Vec<CaptureEvent> {
        let mut events = Vec::new();
        while let Ok(Some(ev)) =
            tokio::time::timeout(Duration::from_secs(1), rx.recv()).await
        {
            let terminal = matches!(ev, CaptureEvent::Utterance(_) | CaptureEvent::Failed(_));
            events.push(ev);
            if terminal {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn one_terminal_event_per_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recognizer = Arc::new(ScriptedRecognizer {
            transcript: "hello there",
            delay: Duration::from_millis(10),
            calls: AtomicUsize::new(0),
        });
        let mut adapter = CaptureAdapter::new(recognizer, tx);

        adapter.start_listening();
        let events = drain_until_terminal(&mut rx).await;
        assert_eq!(
            events,
            vec![
                CaptureEvent::ListeningChanged(true),
                CaptureEvent::ListeningChanged(false),
                CaptureEvent::Utterance("hello there".to_owned()),
            ]
        );
        assert!(!adapter.is_listening());
    }

    #[tokio::test]
    async fn start_while_listening_is_a_no_op() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recognizer = Arc::new(ScriptedRecognizer {
            transcript: "only once",
            delay: Duration::from_millis(50),
            calls: AtomicUsize::new(0),
        });
        let counter = Arc::clone(&recognizer);
        let mut adapter = CaptureAdapter::new(recognizer, tx);

        adapter.start_listening();
        adapter.start_listening();
        adapter.start_listening();

        let events = drain_until_terminal(&mut rx).await;
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        let utterances = events
            .iter()
            .filter(|e| matches!(e, CaptureEvent::Utterance(_)))
            .count();
        assert_eq!(utterances, 1);
    }

    #[tokio::test]
    async fn stop_cancels_without_terminal_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recognizer = Arc::new(ScriptedRecognizer {
            transcript: "never delivered",
            delay: Duration::from_secs(60),
            calls: AtomicUsize::new(0),
        });
        let mut adapter = CaptureAdapter::new(recognizer, tx);

        adapter.start_listening();
        assert_eq!(
            rx.recv().await,
            Some(CaptureEvent::ListeningChanged(true))
        );
        adapter.stop_listening();
        assert_eq!(
            tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap(),
            Some(CaptureEvent::ListeningChanged(false))
        );
        // No utterance or error follows.
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );
        assert!(!adapter.is_listening());
    }

    #[tokio::test]
    async fn stop_when_not_listening_is_a_no_op() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recognizer = Arc::new(FailingRecognizer(CaptureError::DeviceError));
        let mut adapter = CaptureAdapter::new(recognizer, tx);

        adapter.stop_listening();
        adapter.stop_listening();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn device_error_is_terminal_and_resets_adapter() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recognizer = Arc::new(FailingRecognizer(CaptureError::DeviceError));
        let mut adapter = CaptureAdapter::new(recognizer, tx);

        adapter.start_listening();
        let events = drain_until_terminal(&mut rx).await;
        assert_eq!(
            events.last(),
            Some(&CaptureEvent::Failed(CaptureError::DeviceError))
        );
        assert!(!adapter.is_listening());

        // Adapter is ready for the next session.
        adapter.start_listening();
        let events = drain_until_terminal(&mut rx).await;
        assert_eq!(
            events.last(),
            Some(&CaptureEvent::Failed(CaptureError::DeviceError))
        );
    }
}
