//! Session state: the transcript, the page context, and the top-level phase.
//!
//! The store holds no logic of its own. It is mutated only by the
//! [`TurnController`](crate::turn::TurnController) in response to user
//! actions and pipeline completions; its invariants (append-only transcript,
//! one page context per session) are part of the turn-taking correctness
//! argument.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human speaking or typing.
    User,
    /// The assistant.
    Model,
}

/// A citation attached to a generated reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    /// Human-readable source title.
    pub title: String,
    /// Source URI.
    pub uri: String,
}

/// One entry in the conversation transcript. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Citations for model messages produced with search grounding.
    /// Order is meaningful and preserved from the generation response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding_sources: Vec<GroundingSource>,
}

impl Message {
    /// Build a user message stamped with the current time.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            grounding_sources: Vec::new(),
        }
    }

    /// Build a model message stamped with the current time.
    pub fn model(text: impl Into<String>, grounding_sources: Vec<GroundingSource>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            timestamp: Utc::now(),
            grounding_sources,
        }
    }
}

/// The page a session is about. Produced once per session by the scrape
/// collaborator (or its grounded-summary fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    pub title: String,
    /// Extracted readable text; empty when the scrape failed.
    pub content: String,
    /// Whether the scrape succeeded. When false, generation calls omit the
    /// page content and the session relies on search grounding.
    pub success: bool,
}

/// Top-level session phase. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// No session: waiting for a URL.
    Idle,
    /// Fetching page context for a submitted URL.
    AwaitingPage,
    /// In conversation about the fetched page.
    Chatting,
}

/// A role/text pair, the history shape the generation collaborator accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
}

/// In-memory session state. Lives only for the process's lifetime.
#[derive(Debug)]
pub struct SessionStore {
    transcript: Vec<Message>,
    page: Option<PageContext>,
    phase: TurnPhase,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            transcript: Vec::new(),
            page: None,
            phase: TurnPhase::Idle,
        }
    }

    /// Append a message to the transcript. The transcript is append-only;
    /// messages are never edited or removed except by [`clear`](Self::clear).
    pub fn append_message(&mut self, message: Message) {
        self.transcript.push(message);
    }

    /// Record the page context for this session.
    pub fn set_page_context(&mut self, page: PageContext) {
        self.page = Some(page);
    }

    pub fn set_phase(&mut self, phase: TurnPhase) {
        self.phase = phase;
    }

    /// Reset to the idle state: empty transcript, no page context.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.page = None;
        self.phase = TurnPhase::Idle;
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn page_context(&self) -> Option<&PageContext> {
        self.page.as_ref()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Page content to pass to generation calls: the extracted text when the
    /// scrape succeeded, empty otherwise.
    pub fn generation_context(&self) -> &str {
        match &self.page {
            Some(page) if page.success => &page.content,
            _ => "",
        }
    }

    /// Project the transcript into role/text pairs for a generation call.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.transcript
            .iter()
            .map(|m| HistoryEntry {
                role: m.role,
                text: m.text.clone(),
            })
            .collect()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
