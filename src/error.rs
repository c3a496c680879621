//! Error types for the voice web-chat pipeline.

/// Why a speech capture session ended without producing an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The platform has no speech recognition primitive. Voice input is
    /// unavailable for the whole session; text input still works.
    #[error("speech recognition not supported on this platform")]
    NotSupported,

    /// The microphone or recognition device failed mid-session. Recoverable:
    /// the caller may start a new capture session.
    #[error("microphone or recognition device error")]
    DeviceError,
}

/// Top-level error type for the voice chat system.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Page scrape error (network, HTTP status, unextractable content).
    #[error("scrape error: {0}")]
    Scrape(String),

    /// Text generation error from the LLM collaborator.
    #[error("generation error: {0}")]
    Generation(String),

    /// Speech synthesis error. Recoverable: the reply text is still shown.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Speech capture error.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Audio playback error.
    #[error("playback error: {0}")]
    Playback(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ChatError>;
