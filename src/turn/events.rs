//! Named events and states for the turn-taking state machine.
//!
//! Every transition in the controller is triggered by one of these events
//! rather than ambient mutation, so the interruption and suppression races
//! can be exercised in tests with fake capture and playback adapters.

use crate::error::Result;
use crate::llm::GeneratedReply;
use crate::playback::EncodedAudio;

/// The single active conversational activity slot. Exactly one value at any
/// instant; the capture adapter may report listening only in `Listening`,
/// and the playback controller may report playing only in `Speaking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Nothing in flight.
    Quiescent,
    /// Microphone open, waiting for an utterance.
    Listening,
    /// Audio captured, transcript not yet delivered.
    PendingRecognition,
    /// A generation request is in flight. New utterances are suppressed.
    Generating,
    /// A synthesis request is in flight. New utterances are suppressed.
    SynthesizingSpeech,
    /// Assistant audio is playing. New utterances interrupt it.
    Speaking,
}

/// Internal pipeline completions delivered back to the controller.
///
/// `epoch` tags results with the session epoch they belong to; results from
/// before a reset are discarded.
#[derive(Debug)]
pub enum TurnEvent {
    /// The generation collaborator finished (or failed).
    GenerationDone {
        epoch: u64,
        result: Result<GeneratedReply>,
    },
    /// The synthesis collaborator finished (or failed).
    SynthesisDone {
        epoch: u64,
        result: Result<EncodedAudio>,
    },
    /// The continuous-mode re-listen delay elapsed. Stale timers (scheduled
    /// before an interruption or reset) carry an old `generation` and are
    /// ignored.
    RelistenDue { generation: u64 },
}

/// Commands a frontend sends to the running controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a session about `url`: scrape, greet, speak the greeting.
    StartSession { url: String },
    /// Submit a typed utterance. Enters the same path as a spoken one.
    SubmitText { text: String },
    /// Open the microphone for the next utterance.
    StartListening,
    /// Close the microphone without waiting for an utterance.
    StopListening,
    /// Toggle automatic re-listen after the assistant finishes speaking.
    SetContinuous(bool),
    /// Tear the session down: stop audio, clear the transcript, go idle.
    Reset,
}
