//! The conversation turn controller: single owner of conversational state.
//!
//! All mutation of [`ChannelState`], the live playback handle, and the
//! session store is serialized through this controller's event handlers.
//! Recognition results, generation completions, and playback lifecycle
//! events arrive asynchronously and may race a new user action; the
//! arbitration rules are:
//!
//! - an utterance arriving while the assistant is **speaking** interrupts
//!   the playback unconditionally (barge-in), and the stopped playback
//!   never schedules a re-listen;
//! - an utterance arriving while a generation or synthesis request is in
//!   flight is **suppressed** — interrupting speech is allowed,
//!   interrupting thought is not;
//! - events from superseded playback handles and from before the latest
//!   reset are discarded.

use crate::capture::{CaptureAdapter, CaptureEvent, SpeechRecognizer};
use crate::config::VoiceChatConfig;
use crate::error::{CaptureError, Result};
use crate::llm::ReplyGenerator;
use crate::playback::{AudioSink, PlaybackController, PlaybackEvent};
use crate::scrape::PageScraper;
use crate::session::{Message, SessionStore, TurnPhase};
use crate::tts::SpeechSynthesizer;
use crate::turn::events::{ChannelState, Command, TurnEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Something the controller received and must dispatch.
enum Inbound {
    Turn(TurnEvent),
    Capture(CaptureEvent),
    Playback(PlaybackEvent),
}

/// Orchestrates one conversation: capture → generate → synthesize → play,
/// with exactly one channel active at a time.
pub struct TurnController {
    config: VoiceChatConfig,
    store: SessionStore,
    state: ChannelState,

    capture: CaptureAdapter,
    capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
    playback: PlaybackController,
    playback_rx: mpsc::UnboundedReceiver<PlaybackEvent>,

    scraper: Arc<dyn PageScraper>,
    generator: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,

    events_tx: mpsc::UnboundedSender<TurnEvent>,
    events_rx: mpsc::UnboundedReceiver<TurnEvent>,

    continuous: bool,
    /// False once the recognizer reports `NotSupported`; text input remains.
    voice_available: bool,
    /// Bumped on reset and new sessions; stamps in-flight pipeline results.
    epoch: u64,
    /// Bumped whenever a scheduled re-listen becomes stale.
    relisten_generation: u64,
}

impl TurnController {
    /// Build a controller wiring the platform seams and collaborators.
    pub fn new(
        config: VoiceChatConfig,
        recognizer: Arc<dyn SpeechRecognizer>,
        sink: Arc<dyn AudioSink>,
        scraper: Arc<dyn PageScraper>,
        generator: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let continuous = config.conversation.continuous;

        Self {
            config,
            store: SessionStore::new(),
            state: ChannelState::Quiescent,
            capture: CaptureAdapter::new(recognizer, capture_tx),
            capture_rx,
            playback: PlaybackController::new(sink, playback_tx),
            playback_rx,
            scraper,
            generator,
            synthesizer,
            events_tx,
            events_rx,
            continuous,
            voice_available: true,
            epoch: 0,
            relisten_generation: 0,
        }
    }

    /// Current channel state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Read access to the session store (transcript, page context, phase).
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Whether continuous mode (auto re-listen) is enabled.
    pub fn continuous(&self) -> bool {
        self.continuous
    }

    /// Whether voice input is available (false after `NotSupported`).
    pub fn voice_available(&self) -> bool {
        self.voice_available
    }

    /// Run until `cancel` fires or the command channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) {
        info!("turn controller running");
        loop {
            enum Step {
                Cancelled,
                Command(Option<Command>),
                Inbound(Inbound),
            }

            let step = tokio::select! {
                () = cancel.cancelled() => Step::Cancelled,
                cmd = commands.recv() => Step::Command(cmd),
                inbound = Self::recv_inbound(
                    &mut self.events_rx,
                    &mut self.capture_rx,
                    &mut self.playback_rx,
                ) => Step::Inbound(inbound),
            };

            match step {
                Step::Cancelled | Step::Command(None) => break,
                Step::Command(Some(cmd)) => self.handle_command(cmd).await,
                Step::Inbound(inbound) => self.dispatch(inbound),
            }
        }
        self.reset_session();
        info!("turn controller stopped");
    }

    /// Process the next pending pipeline, capture, or playback event.
    ///
    /// `run` calls this in its loop; tests drive the controller with it
    /// directly.
    pub async fn process_next_event(&mut self) {
        let inbound = Self::recv_inbound(
            &mut self.events_rx,
            &mut self.capture_rx,
            &mut self.playback_rx,
        )
        .await;
        self.dispatch(inbound);
    }

    async fn recv_inbound(
        events_rx: &mut mpsc::UnboundedReceiver<TurnEvent>,
        capture_rx: &mut mpsc::UnboundedReceiver<CaptureEvent>,
        playback_rx: &mut mpsc::UnboundedReceiver<PlaybackEvent>,
    ) -> Inbound {
        tokio::select! {
            Some(ev) = events_rx.recv() => Inbound::Turn(ev),
            Some(ev) = capture_rx.recv() => Inbound::Capture(ev),
            Some(ev) = playback_rx.recv() => Inbound::Playback(ev),
        }
    }

    fn dispatch(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Turn(ev) => self.handle_turn_event(ev),
            Inbound::Capture(ev) => self.handle_capture_event(ev),
            Inbound::Playback(ev) => self.handle_playback_event(ev),
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartSession { url } => {
                if let Err(e) = self.start_session(&url).await {
                    warn!("start_session failed: {e}");
                }
            }
            Command::SubmitText { text } => self.submit_utterance(&text),
            Command::StartListening => self.begin_listening(),
            Command::StopListening => self.stop_listening(),
            Command::SetContinuous(enabled) => self.set_continuous(enabled),
            Command::Reset => self.reset_session(),
        }
    }

    // -- Public operations --

    /// Start a session about `url`.
    ///
    /// Scrapes the page; on scrape failure falls back to a search-grounded
    /// summary. Either way exactly one initial model message is appended,
    /// the phase moves to `Chatting`, and the message is spoken.
    ///
    /// # Errors
    ///
    /// Returns an error only when the scrape failed *and* the grounded
    /// summary failed too; the session returns to `Idle`.
    pub async fn start_session(&mut self, url: &str) -> Result<Message> {
        self.reset_session();
        self.store.set_phase(TurnPhase::AwaitingPage);
        info!("starting session for {url}");

        let page = self.scraper.scrape(url).await;
        let initial = if page.success {
            let subject = if page.title.is_empty() {
                url
            } else {
                page.title.as_str()
            };
            Message::model(
                format!("I've analyzed the content of {subject}. What would you like to know?"),
                Vec::new(),
            )
        } else {
            info!("scrape failed for {url}, falling back to grounded summary");
            match self.generator.generate_grounded_summary(url).await {
                Ok(reply) => Message::model(reply.text, reply.grounding_sources),
                Err(e) => {
                    self.store.set_phase(TurnPhase::Idle);
                    return Err(e);
                }
            }
        };

        self.store.set_page_context(page);
        self.store.append_message(initial.clone());
        self.store.set_phase(TurnPhase::Chatting);
        self.speak(initial.text.clone());
        Ok(initial)
    }

    /// Submit a user utterance, spoken or typed.
    ///
    /// Empty text is ignored. While a generation or synthesis request is in
    /// flight the utterance is suppressed. While the assistant is speaking,
    /// playback is stopped first (barge-in) and the utterance proceeds.
    pub fn submit_utterance(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if matches!(
            self.state,
            ChannelState::Generating | ChannelState::SynthesizingSpeech
        ) {
            debug!("utterance suppressed: a turn is already in flight");
            return;
        }

        // Barge-in: the user always wins over in-progress assistant audio.
        self.playback.stop_current();
        self.capture.stop_listening();
        self.relisten_generation += 1;

        let history = self.store.history();
        let page_context = self.store.generation_context().to_owned();
        self.store.append_message(Message::user(text));
        self.state = ChannelState::Generating;

        let generator = Arc::clone(&self.generator);
        let events_tx = self.events_tx.clone();
        let epoch = self.epoch;
        let user_text = text.to_owned();
        tokio::spawn(async move {
            let result = generator
                .generate_reply(&user_text, &page_context, &history)
                .await;
            let _ = events_tx.send(TurnEvent::GenerationDone { epoch, result });
        });
    }

    /// Open the microphone for the next utterance. No-op while any other
    /// channel is active or when voice input is unavailable.
    pub fn begin_listening(&mut self) {
        if !self.voice_available {
            warn!("voice input unavailable, not listening");
            return;
        }
        match self.state {
            ChannelState::Quiescent => {
                // A start racing a previous session's teardown is swallowed
                // by the adapter; only a real session moves the state.
                if self.capture.start_listening() {
                    self.state = ChannelState::Listening;
                }
            }
            ChannelState::Listening => {} // idempotent
            other => debug!("not listening while {other:?}"),
        }
    }

    /// Close the microphone without waiting for an utterance. Idempotent.
    pub fn stop_listening(&mut self) {
        self.capture.stop_listening();
        if matches!(
            self.state,
            ChannelState::Listening | ChannelState::PendingRecognition
        ) {
            self.state = ChannelState::Quiescent;
        }
    }

    /// Enable or disable continuous mode at runtime.
    pub fn set_continuous(&mut self, enabled: bool) {
        self.continuous = enabled;
    }

    /// Tear the session down: stop playback and capture, clear the
    /// transcript and page context, return to `Idle`/`Quiescent`.
    pub fn reset_session(&mut self) {
        self.epoch += 1;
        self.relisten_generation += 1;
        self.playback.stop_current();
        self.capture.stop_listening();
        self.store.clear();
        self.state = ChannelState::Quiescent;
    }

    // -- Event handlers --

    fn handle_turn_event(&mut self, event: TurnEvent) {
        match event {
            TurnEvent::GenerationDone { epoch, result } => {
                if epoch != self.epoch {
                    debug!("dropping generation result from a previous session");
                    return;
                }
                if self.state != ChannelState::Generating {
                    debug!("dropping generation result in state {:?}", self.state);
                    return;
                }
                match result {
                    Ok(reply) => {
                        self.store
                            .append_message(Message::model(reply.text.clone(), reply.grounding_sources));
                        self.speak(reply.text);
                    }
                    Err(e) => {
                        warn!("generation failed: {e}");
                        self.state = ChannelState::Quiescent;
                    }
                }
            }
            TurnEvent::SynthesisDone { epoch, result } => {
                if epoch != self.epoch {
                    debug!("dropping synthesis result from a previous session");
                    return;
                }
                if self.state != ChannelState::SynthesizingSpeech {
                    debug!("dropping synthesis result in state {:?}", self.state);
                    return;
                }
                match result {
                    Ok(audio) => {
                        // State stays SynthesizingSpeech until output begins;
                        // Speaking is gated on the Started event.
                        self.playback.play(audio);
                    }
                    Err(e) => {
                        // Recoverable: the reply text is already in the
                        // transcript, it just won't be spoken. No re-listen:
                        // nothing completed speaking.
                        warn!("synthesis failed, reply will not be spoken: {e}");
                        self.state = ChannelState::Quiescent;
                    }
                }
            }
            TurnEvent::RelistenDue { generation } => {
                if generation != self.relisten_generation {
                    debug!("dropping stale re-listen timer");
                    return;
                }
                if self.state == ChannelState::Quiescent {
                    self.begin_listening();
                }
            }
        }
    }

    fn handle_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::ListeningChanged(true) => {}
            CaptureEvent::ListeningChanged(false) => {
                // Audio ended; the terminal utterance or error is still on
                // its way. A cooperative stop already moved the state on.
                if self.state == ChannelState::Listening {
                    self.state = ChannelState::PendingRecognition;
                }
            }
            CaptureEvent::Utterance(text) => {
                if self.state == ChannelState::PendingRecognition {
                    self.state = ChannelState::Quiescent;
                }
                self.submit_utterance(&text);
            }
            CaptureEvent::Failed(e) => {
                if matches!(
                    self.state,
                    ChannelState::Listening | ChannelState::PendingRecognition
                ) {
                    self.state = ChannelState::Quiescent;
                }
                match e {
                    CaptureError::NotSupported => {
                        warn!("speech recognition unsupported; voice input disabled");
                        self.voice_available = false;
                    }
                    CaptureError::DeviceError => {
                        warn!("capture device error; user may retry listening");
                    }
                }
            }
        }
    }

    fn handle_playback_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Started(handle) => {
                if self.playback.live_handle() != Some(handle) {
                    debug!("ignoring start of superseded playback {handle:?}");
                    return;
                }
                if self.state == ChannelState::SynthesizingSpeech {
                    self.state = ChannelState::Speaking;
                }
            }
            PlaybackEvent::Ended(handle) => {
                if self.playback.live_handle() != Some(handle) {
                    // A barge-in stopped this handle after its natural end
                    // was already queued; it no longer drives the turn.
                    debug!("ignoring end of superseded playback {handle:?}");
                    return;
                }
                self.playback.on_ended(handle);
                if self.state == ChannelState::Speaking {
                    self.state = ChannelState::Quiescent;
                    if self.continuous && self.store.phase() == TurnPhase::Chatting {
                        self.schedule_relisten();
                    }
                }
            }
        }
    }

    // -- Internals --

    /// Hand `text` to the synthesis collaborator and move to
    /// `SynthesizingSpeech`. Playback begins when the result arrives.
    fn speak(&mut self, text: String) {
        self.state = ChannelState::SynthesizingSpeech;
        let synthesizer = Arc::clone(&self.synthesizer);
        let events_tx = self.events_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = synthesizer.synthesize(&text).await;
            let _ = events_tx.send(TurnEvent::SynthesisDone { epoch, result });
        });
    }

    /// Schedule the continuous-mode re-listen after the fixed delay. The
    /// delay bridges the platform's audio teardown lag and is validated
    /// nonzero.
    fn schedule_relisten(&mut self) {
        self.relisten_generation += 1;
        let generation = self.relisten_generation;
        let delay = Duration::from_millis(self.config.conversation.relisten_delay_ms.max(1));
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events_tx.send(TurnEvent::RelistenDue { generation });
        });
    }
}
