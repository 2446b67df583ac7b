//! Boundary Models
//!
//! Presentation payloads and session metadata crossing to the transport
//! layer. These are the only shapes serialized at the system boundary; all
//! internal state keeps its tagged enum types.

use crate::decision::Action;
use crate::session::{Evaluation, Phase, SessionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Theory,
    Practice,
    Evaluation,
    Feedback,
    System,
    Error,
}

/// What one executed step presents to the learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPayload {
    pub action: Action,
    pub content_type: ContentKind,
    /// User-facing text, always displayable as-is.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub requires_input: bool,
    #[serde(default)]
    pub is_final_step: bool,
    /// Technical detail for an error step, distinct from the fallback `text`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl StepPayload {
    pub fn content(action: Action, content_type: ContentKind, text: impl Into<String>) -> Self {
        Self {
            action,
            content_type,
            text: text.into(),
            image_url: None,
            audio_url: None,
            requires_input: false,
            is_final_step: false,
            error_detail: None,
        }
    }

    /// An error step carrying a displayable fallback message plus detail.
    pub fn error(fallback: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error_detail: Some(detail.into()),
            ..Self::content(Action::Error, ContentKind::Error, fallback)
        }
    }

    /// The defensive payload returned while an answer is still pending.
    pub fn pause() -> Self {
        Self {
            requires_input: true,
            ..Self::content(
                Action::Pause,
                ContentKind::System,
                "Waiting for your answer to the current problem.",
            )
        }
    }

    pub fn with_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    pub fn with_audio(mut self, audio_url: Option<String>) -> Self {
        self.audio_url = audio_url;
        self
    }

    pub fn requiring_input(mut self) -> Self {
        self.requires_input = true;
        self
    }

    pub fn finalizing(mut self) -> Self {
        self.is_final_step = true;
        self
    }

    pub fn is_error(&self) -> bool {
        self.action == Action::Error
    }
}

/// Read-only snapshot of a session for callers and dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub topic: String,
    pub phase: Phase,
    pub mastery: f64,
    pub consecutive_correct: u32,
    pub consecutive_incorrect: u32,
    pub waiting_for_input: bool,
    pub last_action: Option<Action>,
    pub last_evaluation: Option<Evaluation>,
    pub error_feedback_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SessionState> for SessionMetadata {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id,
            user_id: state.user_id.clone(),
            topic: state.current_topic.clone(),
            phase: state.current_phase,
            mastery: state.current_mastery(),
            consecutive_correct: state.consecutive_correct,
            consecutive_incorrect: state.consecutive_incorrect,
            waiting_for_input: state.waiting_for_input,
            last_action: state.last_action,
            last_evaluation: state.last_evaluation,
            error_feedback_count: state.error_feedback_count,
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

/// Returned by session creation: the id, the first presented content, and a
/// state snapshot, all in one synchronous round trip.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub initial_payload: StepPayload,
    pub metadata: SessionMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_separates_fallback_from_detail() {
        let payload = StepPayload::error("Something went wrong, let's retry.", "timeout after 30s");
        assert!(payload.is_error());
        assert_eq!(payload.content_type, ContentKind::Error);
        assert_eq!(payload.text, "Something went wrong, let's retry.");
        assert_eq!(payload.error_detail.as_deref(), Some("timeout after 30s"));
        assert!(!payload.requires_input);
    }

    #[test]
    fn pause_payload_requires_input() {
        let payload = StepPayload::pause();
        assert_eq!(payload.action, Action::Pause);
        assert!(payload.requires_input);
        assert!(!payload.is_final_step);
    }

    #[test]
    fn optional_urls_are_omitted_from_json() {
        let payload = StepPayload::content(Action::PresentTheory, ContentKind::Theory, "text");
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("image_url"));
        assert!(!json.contains("audio_url"));
        assert!(!json.contains("error_detail"));

        let with_media = payload.with_image(Some("img://1".into()));
        let json = serde_json::to_string(&with_media).unwrap();
        assert!(json.contains("img://1"));
    }

    #[test]
    fn metadata_snapshots_session_state() {
        let mut state = SessionState::new("addition".into(), "space".into(), 0.1, Some("u1".into()));
        state.consecutive_correct = 2;
        state.waiting_for_input = true;
        let meta = SessionMetadata::from(&state);
        assert_eq!(meta.topic, "addition");
        assert_eq!(meta.phase, Phase::Concrete);
        assert_eq!(meta.consecutive_correct, 2);
        assert!(meta.waiting_for_input);
        assert_eq!(meta.user_id.as_deref(), Some("u1"));
    }
}
