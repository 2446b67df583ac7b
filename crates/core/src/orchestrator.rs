//! Session Orchestrator
//!
//! Owns the session store and drives the decide → execute → (repeat or
//! pause) loop. Each session's state sits behind its own async mutex, so
//! operations on one session serialize while independent sessions proceed
//! concurrently. The store's outer lock is held only for map access, never
//! across a generator call.

use crate::actions;
use crate::config::Rules;
use crate::content::ContentGenerator;
use crate::curriculum::Curriculum;
use crate::decision::{Action, decide};
use crate::models::{SessionCreated, SessionMetadata, StepPayload};
use crate::session::{ChatMessage, SessionState};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const UNKNOWN_ACTION_FALLBACK: &str =
    "Something unexpected happened on my side. Let's pick up where we left off.";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown session: {0}")]
    UnknownSession(Uuid),
    #[error("The curriculum holds no topics; cannot start a session")]
    EmptyCurriculum,
}

pub struct Orchestrator {
    curriculum: Arc<Curriculum>,
    generator: Arc<dyn ContentGenerator>,
    rules: Rules,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionState>>>>,
}

impl Orchestrator {
    pub fn new(
        curriculum: Arc<Curriculum>,
        generator: Arc<dyn ContentGenerator>,
        rules: Rules,
    ) -> Self {
        Self {
            curriculum,
            generator,
            rules,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Starts a session on `topic_id` (falling back to the curriculum's
    /// first topic for unknown ids) and runs one step so the caller gets
    /// initial content together with the session id.
    #[instrument(skip_all, fields(topic_id, theme))]
    pub async fn create_session(
        &self,
        topic_id: &str,
        theme: &str,
        initial_mastery: Option<f64>,
        user_id: Option<String>,
    ) -> Result<SessionCreated, EngineError> {
        let topic = self
            .curriculum
            .resolve_or_first(topic_id)
            .ok_or(EngineError::EmptyCurriculum)?;
        if topic.id != topic_id {
            warn!(
                requested = %topic_id,
                resolved = %topic.id,
                "Requested topic unknown, falling back to the roadmap's first topic"
            );
        }

        let mut state = SessionState::new(
            topic.id.clone(),
            theme.to_string(),
            initial_mastery.unwrap_or(self.rules.initial_mastery),
            user_id,
        );
        let session_id = state.session_id;
        info!(%session_id, topic = %state.current_topic, "Session created");

        let initial_payload = self.execute_step(&mut state).await;
        let metadata = SessionMetadata::from(&state);

        self.sessions
            .write()
            .await
            .insert(session_id, Arc::new(Mutex::new(state)));

        Ok(SessionCreated {
            session_id,
            initial_payload,
            metadata,
        })
    }

    /// Runs one decide → execute cycle for the session.
    #[instrument(skip_all, fields(%session_id))]
    pub async fn process_step(&self, session_id: Uuid) -> Result<StepPayload, EngineError> {
        let session = self.session(session_id).await?;
        let mut state = session.lock().await;
        Ok(self.execute_step(&mut state).await)
    }

    /// Evaluates a learner answer, then (once evaluation has released the
    /// waiting flag) runs one more step, returning both payloads in order so
    /// the caller can render feedback and the next question in one turn.
    #[instrument(skip_all, fields(%session_id))]
    pub async fn handle_user_input(
        &self,
        session_id: Uuid,
        answer: &str,
    ) -> Result<Vec<StepPayload>, EngineError> {
        let session = self.session(session_id).await?;
        let mut state = session.lock().await;

        if !state.waiting_for_input {
            // Tolerated, not rejected: evaluation itself copes with the
            // missing-problem case.
            warn!("Answer received while no input was expected");
        }

        let evaluation =
            actions::evaluate_answer(&mut state, self.generator.as_ref(), answer).await;
        let mut payloads = vec![evaluation];
        if !state.waiting_for_input {
            payloads.push(self.execute_step(&mut state).await);
        }
        Ok(payloads)
    }

    pub async fn get_metadata(&self, session_id: Uuid) -> Result<SessionMetadata, EngineError> {
        let session = self.session(session_id).await?;
        let state = session.lock().await;
        Ok(SessionMetadata::from(&*state))
    }

    /// The append-ordered transcript of a session.
    pub async fn get_transcript(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, EngineError> {
        let session = self.session(session_id).await?;
        let state = session.lock().await;
        Ok(state.messages.clone())
    }

    /// Removes sessions whose `updated_at` is older than `max_age`. Sessions
    /// with an operation in flight are left alone; they are active by
    /// definition. Returns the number removed.
    pub async fn cleanup_inactive(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|session_id, entry| match entry.try_lock() {
            Ok(state) => {
                let keep = now - state.updated_at <= max_age;
                if !keep {
                    info!(%session_id, "Removing inactive session");
                }
                keep
            }
            Err(_) => true,
        });
        before - sessions.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, session_id: Uuid) -> Result<Arc<Mutex<SessionState>>, EngineError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(EngineError::UnknownSession(session_id))
    }

    /// decide → execute, plus a recomputed next-action hint for diagnostics.
    /// Must be called with the session's lock held.
    async fn execute_step(&self, state: &mut SessionState) -> StepPayload {
        if state.waiting_for_input {
            warn!("process_step called while waiting for learner input");
            return StepPayload::pause();
        }

        let action = decide(state, &self.rules);
        let payload = self.run_handler(action, state).await;
        let next_hint = decide(state, &self.rules);
        debug!(%action, %next_hint, "Step executed");
        payload
    }

    async fn run_handler(&self, action: Action, state: &mut SessionState) -> StepPayload {
        let curriculum = self.curriculum.as_ref();
        let generator = self.generator.as_ref();
        match action {
            Action::PresentTheory => actions::present_theory(state, curriculum, generator).await,
            Action::PresentGuidedPractice => {
                actions::present_guided_practice(state, curriculum, generator, &self.rules).await
            }
            Action::PresentIndependentPractice => {
                actions::present_independent_practice(state, curriculum, generator, &self.rules)
                    .await
            }
            Action::ProvideTargetedFeedback => {
                actions::provide_targeted_feedback(state, curriculum, generator).await
            }
            Action::SimplifyInstruction => {
                actions::simplify_instruction(state, curriculum, generator, &self.rules).await
            }
            Action::CheckAdvanceTopic => {
                actions::check_advance_topic(state, curriculum, generator, &self.rules).await
            }
            Action::Pause => StepPayload::pause(),
            Action::EvaluateAnswer | Action::Error => {
                error!(%action, "Decision produced an action with no handler");
                state.last_action = Some(Action::Error);
                state.touch();
                StepPayload::error(
                    UNKNOWN_ACTION_FALLBACK,
                    format!("no handler for action '{action}'"),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ScriptedGenerator;
    use crate::models::ContentKind;
    use crate::session::Evaluation;
    use approx::assert_relative_eq;

    fn curriculum() -> Arc<Curriculum> {
        Arc::new(
            Curriculum::from_json(
                r#"[{
                    "id": "arithmetic",
                    "title": "Arithmetic",
                    "topics": [
                        {"id": "addition", "title": "Addition"},
                        {"id": "subtraction", "title": "Subtraction"}
                    ]
                }]"#,
            )
            .unwrap(),
        )
    }

    fn orchestrator(generator: Arc<ScriptedGenerator>) -> Orchestrator {
        Orchestrator::new(curriculum(), generator, Rules::default())
    }

    #[tokio::test]
    async fn create_session_presents_theory_synchronously() {
        let generator = Arc::new(ScriptedGenerator::with_replies(["Addition basics."]));
        let orchestrator = orchestrator(generator);

        let created = orchestrator
            .create_session("addition", "space", None, Some("u1".into()))
            .await
            .unwrap();

        assert_eq!(created.initial_payload.action, Action::PresentTheory);
        assert_eq!(created.initial_payload.text, "Addition basics.");
        assert_eq!(created.metadata.topic, "addition");
        assert_relative_eq!(created.metadata.mastery, 0.1);
        assert!(!created.metadata.waiting_for_input);
        assert_eq!(orchestrator.session_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_topic_falls_back_to_first() {
        let generator = Arc::new(ScriptedGenerator::new());
        let orchestrator = orchestrator(generator);

        let created = orchestrator
            .create_session("no-such-topic", "space", None, None)
            .await
            .unwrap();

        assert_eq!(created.metadata.topic, "addition");
    }

    #[tokio::test]
    async fn empty_curriculum_cannot_start_sessions() {
        let orchestrator = Orchestrator::new(
            Arc::new(Curriculum::new(vec![])),
            Arc::new(ScriptedGenerator::new()),
            Rules::default(),
        );
        let err = orchestrator
            .create_session("addition", "space", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyCurriculum));
    }

    #[tokio::test]
    async fn unknown_session_errors_on_every_surface() {
        let orchestrator = orchestrator(Arc::new(ScriptedGenerator::new()));
        let id = Uuid::new_v4();
        assert!(matches!(
            orchestrator.process_step(id).await,
            Err(EngineError::UnknownSession(_))
        ));
        assert!(matches!(
            orchestrator.handle_user_input(id, "7").await,
            Err(EngineError::UnknownSession(_))
        ));
        assert!(matches!(
            orchestrator.get_metadata(id).await,
            Err(EngineError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn waiting_session_pauses_instead_of_deciding() {
        let generator = Arc::new(ScriptedGenerator::with_replies([
            "Theory.",
            "What is 3 + 4?\nSOLUTION: The answer is 7.",
        ]));
        let orchestrator = orchestrator(generator);
        let created = orchestrator
            .create_session("addition", "space", None, None)
            .await
            .unwrap();

        // Theory shown; next step presents guided practice and waits.
        let practice = orchestrator.process_step(created.session_id).await.unwrap();
        assert_eq!(practice.action, Action::PresentGuidedPractice);
        assert!(practice.requires_input);

        // A further step without an answer must be a defensive pause.
        let pause = orchestrator.process_step(created.session_id).await.unwrap();
        assert_eq!(pause.action, Action::Pause);
        assert_eq!(pause.content_type, ContentKind::System);
    }

    #[tokio::test]
    async fn handle_user_input_returns_evaluation_and_next_step() {
        let generator = Arc::new(ScriptedGenerator::with_replies([
            "Theory.",
            "What is 3 + 4?\nSOLUTION: The answer is 7.",
            "CORRECT: Great work.",
            "Try 13 + 28.\nSOLUTION: The answer is 41.",
        ]));
        let orchestrator = orchestrator(generator);
        let created = orchestrator
            .create_session("addition", "space", None, None)
            .await
            .unwrap();
        orchestrator.process_step(created.session_id).await.unwrap();

        let payloads = orchestrator
            .handle_user_input(created.session_id, "7")
            .await
            .unwrap();

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].action, Action::EvaluateAnswer);
        assert_eq!(payloads[0].text, "Great work.");
        // Mastery 0.1 + guided gain (0.11 at 0.1 mastery) stays below the
        // low-mastery bar, so the follow-up is guided practice again.
        assert_eq!(payloads[1].action, Action::PresentGuidedPractice);

        let metadata = orchestrator.get_metadata(created.session_id).await.unwrap();
        assert_eq!(metadata.consecutive_correct, 1);
        assert_eq!(metadata.last_evaluation, Some(Evaluation::Correct));
        assert!(metadata.waiting_for_input);
    }

    #[tokio::test]
    async fn unexpected_input_degrades_to_error_plus_step() {
        let generator = Arc::new(ScriptedGenerator::with_replies(["Theory.", "More theory."]));
        let orchestrator = orchestrator(generator);
        let created = orchestrator
            .create_session("addition", "space", None, None)
            .await
            .unwrap();

        // No practice presented, so no problem is pending.
        let payloads = orchestrator
            .handle_user_input(created.session_id, "7")
            .await
            .unwrap();

        assert_eq!(payloads.len(), 2);
        assert!(payloads[0].is_error());
        // The session is not stuck: the follow-up step proceeds normally.
        assert_ne!(payloads[1].action, Action::Pause);
    }

    #[tokio::test]
    async fn transcript_preserves_append_order() {
        let generator = Arc::new(ScriptedGenerator::with_replies([
            "Theory.",
            "What is 3 + 4?\nSOLUTION: The answer is 7.",
            "CORRECT",
            "Next problem.\nSOLUTION: The answer is 9.",
        ]));
        let orchestrator = orchestrator(generator);
        let created = orchestrator
            .create_session("addition", "space", None, None)
            .await
            .unwrap();
        orchestrator.process_step(created.session_id).await.unwrap();
        orchestrator
            .handle_user_input(created.session_id, "7")
            .await
            .unwrap();

        let transcript = orchestrator
            .get_transcript(created.session_id)
            .await
            .unwrap();
        let texts: Vec<&str> = transcript.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts[0], "Theory.");
        assert_eq!(texts[1], "What is 3 + 4?");
        assert_eq!(texts[2], "7");
        for pair in transcript.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn cleanup_removes_only_stale_sessions() {
        let generator = Arc::new(ScriptedGenerator::new());
        let orchestrator = orchestrator(generator);
        let created = orchestrator
            .create_session("addition", "space", None, None)
            .await
            .unwrap();

        assert_eq!(orchestrator.cleanup_inactive(Duration::hours(1)).await, 0);
        assert_eq!(orchestrator.session_count().await, 1);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(orchestrator.cleanup_inactive(Duration::zero()).await, 1);
        assert_eq!(orchestrator.session_count().await, 0);
        assert!(matches!(
            orchestrator.process_step(created.session_id).await,
            Err(EngineError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn seeded_mastery_overrides_default() {
        let generator = Arc::new(ScriptedGenerator::with_replies([
            "Try 13 + 28.\nSOLUTION: The answer is 41.",
        ]));
        let orchestrator = orchestrator(generator);

        let created = orchestrator
            .create_session("addition", "space", Some(0.5), None)
            .await
            .unwrap();

        // Mid-band mastery skips theory and goes straight to independent
        // practice.
        assert_eq!(
            created.initial_payload.action,
            Action::PresentIndependentPractice
        );
        assert_relative_eq!(created.metadata.mastery, 0.5);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let generator = Arc::new(ScriptedGenerator::with_replies(["One.", "Two."]));
        let orchestrator = orchestrator(generator);
        let a = orchestrator
            .create_session("addition", "space", None, None)
            .await
            .unwrap();
        let b = orchestrator
            .create_session("subtraction", "dinosaurs", None, None)
            .await
            .unwrap();

        assert_ne!(a.session_id, b.session_id);
        assert_eq!(orchestrator.session_count().await, 2);
        let meta_a = orchestrator.get_metadata(a.session_id).await.unwrap();
        let meta_b = orchestrator.get_metadata(b.session_id).await.unwrap();
        assert_eq!(meta_a.topic, "addition");
        assert_eq!(meta_b.topic, "subtraction");
    }
}
