//! Student Session State
//!
//! The mutable aggregate owned exclusively by one tutoring session. All
//! pedagogical state lives here; mutation happens only through the action
//! handlers and the evaluation step, and every mutation path goes through
//! [`SessionState::touch`] so `updated_at` stays monotonic.

use crate::decision::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// The CPA instructional progression: Concrete → Pictorial → Abstract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Concrete,
    Pictorial,
    Abstract,
}

impl Phase {
    /// Steps one stage back toward Concrete; no-op at Concrete.
    pub fn step_back(self) -> Phase {
        match self {
            Phase::Abstract => Phase::Pictorial,
            Phase::Pictorial => Phase::Concrete,
            Phase::Concrete => Phase::Concrete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Concrete => "concrete",
            Phase::Pictorial => "pictorial",
            Phase::Abstract => "abstract",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict produced by evaluating a learner answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluation {
    Correct,
    IncorrectConceptual,
    IncorrectCalculation,
    Unclear,
}

impl Evaluation {
    pub fn is_incorrect(self) -> bool {
        matches!(
            self,
            Evaluation::IncorrectConceptual | Evaluation::IncorrectCalculation
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Evaluation::Correct => "correct",
            Evaluation::IncorrectConceptual => "incorrect_conceptual",
            Evaluation::IncorrectCalculation => "incorrect_calculation",
            Evaluation::Unclear => "unclear",
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Learner,
    Tutor,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::Learner => write!(f, "learner"),
            MessageRole::Tutor => write!(f, "tutor"),
        }
    }
}

/// One transcript entry. The message log is strictly append-ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    Guided,
    Independent,
}

/// The most recently presented practice item, held until it is replaced or
/// the session advances to a new topic. `solution_text` is the final answer
/// extracted from the generated solution block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeProblem {
    pub problem_text: String,
    pub solution_text: String,
    pub kind: ProblemKind,
    pub mastery_gain: f64,
    pub mastery_loss: f64,
}

/// Per-session mutable state. See the module docs for ownership rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_topic: String,
    pub current_phase: Phase,
    /// Per-topic mastery in [0,1]. Unseen topics read as 0.0.
    pub mastery: HashMap<String, f64>,
    pub theory_shown: HashSet<String>,
    pub consecutive_correct: u32,
    pub consecutive_incorrect: u32,
    pub last_action: Option<Action>,
    pub last_evaluation: Option<Evaluation>,
    pub last_problem: Option<PracticeProblem>,
    /// True exactly when presented content awaits a learner answer.
    pub waiting_for_input: bool,
    /// Targeted-feedback deliveries since the last correct answer or topic change.
    pub error_feedback_count: u32,
    /// Free-text personalization tag, forwarded to generator prompts only.
    pub theme: String,
    pub messages: Vec<ChatMessage>,
}

impl SessionState {
    pub fn new(
        topic_id: String,
        theme: String,
        initial_mastery: f64,
        user_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let mut mastery = HashMap::new();
        mastery.insert(topic_id.clone(), initial_mastery.clamp(0.0, 1.0));
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            created_at: now,
            updated_at: now,
            current_topic: topic_id,
            current_phase: Phase::Concrete,
            mastery,
            theory_shown: HashSet::new(),
            consecutive_correct: 0,
            consecutive_incorrect: 0,
            last_action: None,
            last_evaluation: None,
            last_problem: None,
            waiting_for_input: false,
            error_feedback_count: 0,
            theme,
            messages: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Mastery for an arbitrary topic; unseen topics read as 0.0.
    pub fn mastery_for(&self, topic_id: &str) -> f64 {
        self.mastery.get(topic_id).copied().unwrap_or(0.0)
    }

    pub fn current_mastery(&self) -> f64 {
        self.mastery_for(&self.current_topic)
    }

    /// Seeds mastery for a topic if it has never been initialized.
    pub fn init_topic_mastery(&mut self, topic_id: &str, seed: f64) {
        self.mastery
            .entry(topic_id.to_string())
            .or_insert(seed.clamp(0.0, 1.0));
    }

    /// Adds `delta` (which may be negative) to the current topic's mastery,
    /// clamped to [0,1]. The single update path for the clamping invariant.
    pub fn adjust_mastery(&mut self, delta: f64) {
        let updated = (self.current_mastery() + delta).clamp(0.0, 1.0);
        self.mastery.insert(self.current_topic.clone(), updated);
    }

    /// Multiplies the current topic's mastery by `factor`, never dropping
    /// below `floor`.
    pub fn decay_mastery(&mut self, factor: f64, floor: f64) {
        let updated = (self.current_mastery() * factor).max(floor).clamp(0.0, 1.0);
        self.mastery.insert(self.current_topic.clone(), updated);
    }

    /// Records a correct answer: bumps the correct streak, zeroes the
    /// incorrect streak and the feedback counter, applies the mastery gain.
    pub fn record_correct(&mut self, gain: f64) {
        self.consecutive_correct += 1;
        self.consecutive_incorrect = 0;
        self.error_feedback_count = 0;
        self.adjust_mastery(gain);
    }

    /// Records an incorrect (or unclear) answer: the mirror of `record_correct`.
    pub fn record_incorrect(&mut self, loss: f64) {
        self.consecutive_incorrect += 1;
        self.consecutive_correct = 0;
        self.adjust_mastery(-loss);
    }

    pub fn push_message(&mut self, role: MessageRole, text: &str) {
        self.messages.push(ChatMessage {
            role,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }
}
