//! Mentor Core
//!
//! The session decision engine and state machine for an adaptive tutoring
//! system. A session moves through a fixed pedagogical cycle (present theory,
//! guided practice, independent practice, evaluate, feedback/advance), with
//! content difficulty following a per-topic mastery score.
//!
//! The crate is transport-agnostic: a web layer consumes the
//! [`orchestrator::Orchestrator`] surface, and all generative content flows
//! through the [`content::ContentGenerator`] trait.

mod actions;
pub mod config;
pub mod content;
pub mod curriculum;
pub mod decision;
pub mod extract;
pub mod models;
pub mod orchestrator;
pub mod session;

pub use config::Rules;
pub use content::ContentGenerator;
pub use curriculum::{Curriculum, Roadmap, Topic};
pub use decision::{Action, decide};
pub use models::{SessionCreated, SessionMetadata, StepPayload};
pub use orchestrator::{EngineError, Orchestrator};
pub use session::{Evaluation, Phase, SessionState};
