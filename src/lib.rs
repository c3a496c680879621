//! Sitevoice: turn-based voice conversation with the contents of a web page.
//!
//! Speech is captured and transcribed, sent to a text-generation backend
//! together with the scraped page content and the conversation history, the
//! reply is synthesized to speech and played back, and the microphone
//! re-opens for the next turn.
//!
//! # Architecture
//!
//! The hard part is the turn-taking orchestration, owned by a single
//! [`TurnController`](turn::TurnController):
//! - **Capture adapter**: wraps the platform's one-shot recognizer
//! - **Playback controller**: at most one live audio handle, barge-in aware
//! - **Session store**: append-only transcript, page context, session phase
//! - **Collaborators**: page scraper, reply generator, speech synthesizer,
//!   all behind traits so the core never touches a platform global
//!
//! The controller keeps exactly one channel active among listening,
//! transcribing, generating, and speaking: a new user utterance interrupts
//! in-progress speech but is suppressed while a generation or synthesis
//! request is in flight.

pub mod capture;
pub mod config;
pub mod error;
pub mod llm;
pub mod playback;
pub mod scrape;
pub mod session;
pub mod tts;
pub mod turn;

pub use capture::{CaptureAdapter, CaptureEvent, SpeechRecognizer};
pub use config::VoiceChatConfig;
pub use error::{CaptureError, ChatError, Result};
pub use llm::{GeneratedReply, ReplyGenerator};
pub use playback::{
    AudioSink, EncodedAudio, PlaybackController, PlaybackEvent, PlaybackHandle, SinkEvent,
};
pub use scrape::PageScraper;
pub use session::{GroundingSource, Message, PageContext, Role, SessionStore, TurnPhase};
pub use tts::SpeechSynthesizer;
pub use turn::{ChannelState, Command, TurnController, TurnEvent};
