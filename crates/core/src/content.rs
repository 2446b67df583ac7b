//! Content Generator Boundary
//!
//! Defines the contract for the external collaborator that produces theory
//! text, practice problems, evaluation verdicts, and optional image/audio
//! artifacts. Concrete vendor integrations live outside this crate; a
//! scripted implementation ships here for tests and offline development.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Template ids the action handlers request from the generator.
pub mod templates {
    pub const PRESENT_THEORY: &str = "present_theory";
    pub const GUIDED_PRACTICE: &str = "guided_practice";
    pub const INDEPENDENT_PRACTICE: &str = "independent_practice";
    pub const EVALUATE_ANSWER: &str = "evaluate_answer";
    pub const TARGETED_FEEDBACK: &str = "targeted_feedback";
    pub const ADVANCE_TOPIC: &str = "advance_topic";
}

/// Capability set consumed by the action handlers.
///
/// Every method is a potential long-latency, fallible call. Image and audio
/// generation are best-effort: `Ok(None)` is a valid, non-error outcome.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// General-purpose instructed text generation.
    async fn generate_text(&self, role_instructions: &str, user_instructions: &str)
    -> Result<String>;

    /// Text generation via a named template substitution mechanism.
    async fn generate_templated_text(
        &self,
        template_id: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String>;

    /// Best-effort illustration; returns a URL when one was produced.
    async fn generate_image(&self, prompt: &str) -> Result<Option<String>>;

    /// Best-effort narration; returns a URL when one was produced.
    async fn generate_audio(&self, text: &str) -> Result<Option<String>>;
}

/// A deterministic `ContentGenerator` for tests and offline development.
///
/// Text calls pop from a scripted reply queue (falling back to a synthetic
/// reply naming the template) and every call is recorded for assertion.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<String>>,
    last_vars: Mutex<HashMap<String, String>>,
    image_url: Option<String>,
    audio_url: Option<String>,
    fail_text: Mutex<bool>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_media(mut self, image_url: Option<&str>, audio_url: Option<&str>) -> Self {
        self.image_url = image_url.map(str::to_string);
        self.audio_url = audio_url.map(str::to_string);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(reply.into());
    }

    /// Makes every subsequent text call fail, for error-path tests.
    pub fn set_failing(&self, failing: bool) {
        *self.fail_text.lock().unwrap() = failing;
    }

    /// The call log: template ids for templated calls, `text:`/`image:`/
    /// `audio:` prefixed entries otherwise.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Variables passed to the most recent templated call.
    pub fn last_vars(&self) -> HashMap<String, String> {
        self.last_vars.lock().unwrap().clone()
    }

    fn next_reply(&self, fallback: String) -> Result<String> {
        if *self.fail_text.lock().unwrap() {
            anyhow::bail!("scripted generator failure");
        }
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(fallback))
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate_text(
        &self,
        _role_instructions: &str,
        user_instructions: &str,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("text:{user_instructions}"));
        self.next_reply(format!("Scripted reply to: {user_instructions}"))
    }

    async fn generate_templated_text(
        &self,
        template_id: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(template_id.to_string());
        *self.last_vars.lock().unwrap() = variables.clone();
        self.next_reply(format!("Scripted content for template '{template_id}'."))
    }

    async fn generate_image(&self, prompt: &str) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(format!("image:{prompt}"));
        Ok(self.image_url.clone())
    }

    async fn generate_audio(&self, text: &str) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(format!("audio:{text}"));
        Ok(self.audio_url.clone())
    }
}
