//! Decision Engine
//!
//! `decide` is a total, side-effect-free function from session state to the
//! next pedagogical action. The rule ordering below is an explicit contract:
//! the first matching rule wins, and low-mastery theory/guided-practice rules
//! deliberately shadow the feedback, simplification, and advancement rules
//! for any state that satisfies both.

use crate::config::Rules;
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every action the engine can take or record. `decide` only ever returns
/// the pedagogical subset plus `Pause`; `EvaluateAnswer` is entered through
/// the orchestrator's input path and `Error` marks a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Pause,
    PresentTheory,
    PresentGuidedPractice,
    PresentIndependentPractice,
    EvaluateAnswer,
    ProvideTargetedFeedback,
    SimplifyInstruction,
    CheckAdvanceTopic,
    Error,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Pause => "pause",
            Action::PresentTheory => "present_theory",
            Action::PresentGuidedPractice => "present_guided_practice",
            Action::PresentIndependentPractice => "present_independent_practice",
            Action::EvaluateAnswer => "evaluate_answer",
            Action::ProvideTargetedFeedback => "provide_targeted_feedback",
            Action::SimplifyInstruction => "simplify_instruction",
            Action::CheckAdvanceTopic => "check_advance_topic",
            Action::Error => "error",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Selects the next pedagogical action for the given state.
pub fn decide(state: &SessionState, rules: &Rules) -> Action {
    // 1. An unanswered question blocks everything else.
    if state.waiting_for_input {
        return Action::Pause;
    }

    let mastery = state.current_mastery();
    let theory_seen = state.theory_shown.contains(&state.current_topic);

    // 2./3. Low mastery routes to theory first, then guided practice.
    if mastery < rules.low_mastery && !theory_seen {
        return Action::PresentTheory;
    }
    if mastery < rules.low_mastery {
        return Action::PresentGuidedPractice;
    }

    // 4. A pending incorrect evaluation gets targeted remediation.
    if state
        .last_evaluation
        .is_some_and(|e| e.is_incorrect())
    {
        return Action::ProvideTargetedFeedback;
    }

    // 5. A losing streak simplifies the instruction.
    if state.consecutive_incorrect >= rules.simplify_after {
        return Action::SimplifyInstruction;
    }

    // 6. High mastery plus a correct streak opens the advancement gate.
    if (mastery > rules.advance_mastery && state.consecutive_correct >= rules.advance_streak)
        || (mastery > rules.fast_advance_mastery
            && state.consecutive_correct >= rules.fast_advance_streak)
    {
        return Action::CheckAdvanceTopic;
    }

    // 7. The comfort band gets independent practice.
    if mastery >= rules.low_mastery && mastery <= rules.comfort_ceiling {
        return Action::PresentIndependentPractice;
    }

    // 8. Default.
    Action::PresentIndependentPractice
}
