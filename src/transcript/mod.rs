//! Assembly of incremental transcription deltas into finalized turns.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
}

/// One finalized utterance; never mutated after it is appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Default)]
struct TurnBuffers {
    user: String,
    agent: String,
}

/// Per-speaker turn buffers plus the append-only transcript
///
/// Buffers only exist between `begin_session` and `end_session`; deltas
/// arriving outside a session are dropped.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    buffers: Option<TurnBuffers>,
    entries: Vec<TranscriptEntry>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the transcript and open fresh turn buffers
    pub fn begin_session(&mut self) {
        self.entries.clear();
        self.buffers = Some(TurnBuffers::default());
    }

    /// Drop the turn buffers; finalized entries stay readable
    pub fn end_session(&mut self) {
        self.buffers = None;
    }

    pub fn is_active(&self) -> bool {
        self.buffers.is_some()
    }

    /// Append a fragment to the speaker's buffer
    pub fn on_delta(&mut self, speaker: Speaker, fragment: &str) {
        let Some(buffers) = self.buffers.as_mut() else {
            debug!("Dropping {:?} delta outside a session", speaker);
            return;
        };

        match speaker {
            Speaker::User => buffers.user.push_str(fragment),
            Speaker::Agent => buffers.agent.push_str(fragment),
        }
    }

    /// Finalize the turn, returning the entries appended by it
    pub fn on_turn_complete(&mut self) -> &[TranscriptEntry] {
        let start = self.entries.len();
        let Some(buffers) = self.buffers.as_mut() else {
            return &self.entries[start..];
        };

        let user = std::mem::take(&mut buffers.user);
        let agent = std::mem::take(&mut buffers.agent);

        for (speaker, text) in [(Speaker::User, user), (Speaker::Agent, agent)] {
            let text = text.trim();
            if !text.is_empty() {
                self.entries.push(TranscriptEntry {
                    speaker,
                    text: text.to_string(),
                });
            }
        }

        &self.entries[start..]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Text buffered for `speaker` in the current turn
    pub fn pending(&self, speaker: Speaker) -> Option<&str> {
        self.buffers.as_ref().map(|b| match speaker {
            Speaker::User => b.user.as_str(),
            Speaker::Agent => b.agent.as_str(),
        })
    }
}
