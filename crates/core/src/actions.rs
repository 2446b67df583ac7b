//! Action Handlers
//!
//! One handler per pedagogical action. Each consumes the session state and
//! the content generator, applies its state mutations, and returns the
//! presentation payload. Generator text failures are caught here and turned
//! into error payloads; a handler never lets a generator error escape.
//! Image and audio generation are best-effort and degrade to absence.

use crate::config::Rules;
use crate::content::{ContentGenerator, templates};
use crate::curriculum::{Curriculum, Topic};
use crate::decision::Action;
use crate::extract::{extract_final_answer, parse_verdict, split_problem_solution};
use crate::models::{ContentKind, StepPayload};
use crate::session::{
    Evaluation, MessageRole, Phase, PracticeProblem, ProblemKind, SessionState,
};
use std::collections::HashMap;
use tracing::{error, warn};

const GENERATION_FALLBACK: &str =
    "I had trouble preparing that content. Let's try again in a moment.";
const NO_PROBLEM_FALLBACK: &str =
    "There's no active problem to evaluate right now. Let's continue with the lesson.";
const NO_EVALUATION_FALLBACK: &str =
    "There's nothing to give feedback on yet. Let's keep going.";
const UNKNOWN_TOPIC_FALLBACK: &str =
    "I couldn't find that topic in the curriculum. Let's try again.";
const COMPLETION_MESSAGE: &str =
    "Congratulations! You've worked through every topic in this roadmap. \
     This is the end of our course.";

fn template_vars(state: &SessionState, topic: &Topic) -> HashMap<String, String> {
    HashMap::from([
        ("topic_title".to_string(), topic.title.clone()),
        ("topic_description".to_string(), topic.description.clone()),
        ("phase".to_string(), state.current_phase.to_string()),
        ("theme".to_string(), state.theme.clone()),
        (
            "mastery".to_string(),
            format!("{:.2}", state.current_mastery()),
        ),
    ])
}

async fn best_effort_image(generator: &dyn ContentGenerator, prompt: &str) -> Option<String> {
    match generator.generate_image(prompt).await {
        Ok(url) => url,
        Err(e) => {
            warn!(error = ?e, "Image generation failed, continuing without illustration");
            None
        }
    }
}

async fn best_effort_audio(generator: &dyn ContentGenerator, text: &str) -> Option<String> {
    match generator.generate_audio(text).await {
        Ok(url) => url,
        Err(e) => {
            warn!(error = ?e, "Audio generation failed, continuing without narration");
            None
        }
    }
}

/// Converts a text-generation failure into an error step. The state changes
/// already applied by the calling handler stay in place.
fn generation_error(state: &mut SessionState, err: anyhow::Error) -> StepPayload {
    error!(error = ?err, "Content generation failed");
    state.last_action = Some(Action::Error);
    state.touch();
    StepPayload::error(GENERATION_FALLBACK, err.to_string())
}

/// Presents theory for the current topic and marks it as shown.
///
/// The theory-shown flag is set before generation on purpose: re-showing
/// theory is not the retry strategy after a partial failure.
pub(crate) async fn present_theory(
    state: &mut SessionState,
    curriculum: &Curriculum,
    generator: &dyn ContentGenerator,
) -> StepPayload {
    let Some(topic) = curriculum.topic(&state.current_topic) else {
        return StepPayload::error(
            UNKNOWN_TOPIC_FALLBACK,
            format!("unknown topic '{}'", state.current_topic),
        );
    };
    let topic = topic.clone();

    state.theory_shown.insert(state.current_topic.clone());
    state.waiting_for_input = false;

    let vars = template_vars(state, &topic);
    let text = match generator
        .generate_templated_text(templates::PRESENT_THEORY, &vars)
        .await
    {
        Ok(text) => text,
        Err(e) => return generation_error(state, e),
    };

    let image_url = if state.current_phase != Phase::Abstract {
        let prompt = format!(
            "A clear {} illustration of {}, themed around {}",
            state.current_phase, topic.title, state.theme
        );
        best_effort_image(generator, &prompt).await
    } else {
        None
    };
    let audio_url = best_effort_audio(generator, &text).await;

    state.last_action = Some(Action::PresentTheory);
    state.push_message(MessageRole::Tutor, &text);
    state.touch();

    StepPayload::content(Action::PresentTheory, ContentKind::Theory, text)
        .with_image(image_url)
        .with_audio(audio_url)
}

pub(crate) async fn present_guided_practice(
    state: &mut SessionState,
    curriculum: &Curriculum,
    generator: &dyn ContentGenerator,
    rules: &Rules,
) -> StepPayload {
    present_practice(ProblemKind::Guided, state, curriculum, generator, rules).await
}

pub(crate) async fn present_independent_practice(
    state: &mut SessionState,
    curriculum: &Curriculum,
    generator: &dyn ContentGenerator,
    rules: &Rules,
) -> StepPayload {
    present_practice(ProblemKind::Independent, state, curriculum, generator, rules).await
}

/// Requests a combined problem+solution block, splits it, extracts the final
/// answer, stores the pending problem, and hands the problem half to the
/// learner. Leaves the session waiting for input.
async fn present_practice(
    kind: ProblemKind,
    state: &mut SessionState,
    curriculum: &Curriculum,
    generator: &dyn ContentGenerator,
    rules: &Rules,
) -> StepPayload {
    let Some(topic) = curriculum.topic(&state.current_topic) else {
        return StepPayload::error(
            UNKNOWN_TOPIC_FALLBACK,
            format!("unknown topic '{}'", state.current_topic),
        );
    };
    let topic = topic.clone();
    let mastery = state.current_mastery();

    let mut vars = template_vars(state, &topic);
    let (template, action) = match kind {
        ProblemKind::Guided => (templates::GUIDED_PRACTICE, Action::PresentGuidedPractice),
        ProblemKind::Independent => {
            // Feed the previous problem in as context for a harder variant.
            if let Some(previous) = &state.last_problem {
                vars.insert(
                    "previous_problem".to_string(),
                    previous.problem_text.clone(),
                );
            }
            (
                templates::INDEPENDENT_PRACTICE,
                Action::PresentIndependentPractice,
            )
        }
    };

    let raw = match generator.generate_templated_text(template, &vars).await {
        Ok(text) => text,
        Err(e) => {
            state.waiting_for_input = false;
            return generation_error(state, e);
        }
    };

    let (problem_text, solution_half) = split_problem_solution(&raw);
    let solution_text = extract_final_answer(&solution_half);
    let (gain, loss) = match kind {
        ProblemKind::Guided => (rules.guided_gain.at(mastery), rules.guided_loss.at(mastery)),
        ProblemKind::Independent => (
            rules.independent_gain.at(mastery),
            rules.independent_loss.at(mastery),
        ),
    };

    state.last_problem = Some(PracticeProblem {
        problem_text: problem_text.clone(),
        solution_text,
        kind,
        mastery_gain: gain,
        mastery_loss: loss,
    });
    state.last_action = Some(action);
    state.waiting_for_input = true;
    state.push_message(MessageRole::Tutor, &problem_text);
    state.touch();

    let audio_url = best_effort_audio(generator, &problem_text).await;

    StepPayload::content(action, ContentKind::Practice, problem_text)
        .with_audio(audio_url)
        .requiring_input()
}

fn canned_verdict_text(verdict: Evaluation) -> &'static str {
    match verdict {
        Evaluation::Correct => "That's right. Nicely done.",
        Evaluation::IncorrectConceptual => "Not quite. Let's look at the idea behind it.",
        Evaluation::IncorrectCalculation => "Close, but check your arithmetic.",
        Evaluation::Unclear => {
            "I couldn't quite tell. Could you try phrasing your answer differently?"
        }
    }
}

/// Evaluates a learner answer against the pending practice problem.
pub(crate) async fn evaluate_answer(
    state: &mut SessionState,
    generator: &dyn ContentGenerator,
    answer: &str,
) -> StepPayload {
    let Some(problem) = state.last_problem.clone() else {
        warn!("Answer received with no active problem");
        state.waiting_for_input = false;
        state.last_action = Some(Action::Error);
        state.touch();
        return StepPayload::error(NO_PROBLEM_FALLBACK, "no active problem to evaluate");
    };

    let vars = HashMap::from([
        ("problem".to_string(), problem.problem_text.clone()),
        ("expected_answer".to_string(), problem.solution_text.clone()),
        ("learner_answer".to_string(), answer.to_string()),
        ("phase".to_string(), state.current_phase.to_string()),
        ("theme".to_string(), state.theme.clone()),
    ]);
    let raw = match generator
        .generate_templated_text(templates::EVALUATE_ANSWER, &vars)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            state.waiting_for_input = false;
            return generation_error(state, e);
        }
    };

    let (verdict, feedback) = parse_verdict(&raw);
    match verdict {
        Evaluation::Correct => state.record_correct(problem.mastery_gain),
        _ => state.record_incorrect(problem.mastery_loss),
    }
    state.last_evaluation = Some(verdict);
    state.last_action = Some(Action::EvaluateAnswer);
    state.waiting_for_input = false;

    let text = if feedback.is_empty() {
        canned_verdict_text(verdict).to_string()
    } else {
        feedback
    };
    state.push_message(MessageRole::Learner, answer);
    state.push_message(MessageRole::Tutor, &text);
    state.touch();

    let audio_url = best_effort_audio(generator, &text).await;

    StepPayload::content(Action::EvaluateAnswer, ContentKind::Evaluation, text)
        .with_audio(audio_url)
}

/// Delivers empathetic, error-type-aware guidance after an incorrect answer.
/// Consumes the pending evaluation so the feedback condition does not
/// retrigger on the next step.
pub(crate) async fn provide_targeted_feedback(
    state: &mut SessionState,
    curriculum: &Curriculum,
    generator: &dyn ContentGenerator,
) -> StepPayload {
    let Some(evaluation) = state.last_evaluation else {
        warn!("Targeted feedback requested with no recorded evaluation");
        state.waiting_for_input = false;
        state.last_action = Some(Action::Error);
        state.touch();
        return StepPayload::error(NO_EVALUATION_FALLBACK, "no recorded evaluation");
    };
    let Some(topic) = curriculum.topic(&state.current_topic) else {
        return StepPayload::error(
            UNKNOWN_TOPIC_FALLBACK,
            format!("unknown topic '{}'", state.current_topic),
        );
    };
    let topic = topic.clone();

    let mut vars = template_vars(state, &topic);
    vars.insert("error_kind".to_string(), evaluation.to_string());
    if let Some(problem) = &state.last_problem {
        vars.insert("problem".to_string(), problem.problem_text.clone());
    }

    let text = match generator
        .generate_templated_text(templates::TARGETED_FEEDBACK, &vars)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            state.waiting_for_input = false;
            return generation_error(state, e);
        }
    };

    // Only conceptual errors get an illustration; calculation slips don't
    // benefit from one.
    let image_url = if evaluation == Evaluation::IncorrectConceptual {
        let prompt = format!("A simple diagram clarifying the concept of {}", topic.title);
        best_effort_image(generator, &prompt).await
    } else {
        None
    };
    let audio_url = best_effort_audio(generator, &text).await;

    state.error_feedback_count += 1;
    state.last_evaluation = None;
    state.last_action = Some(Action::ProvideTargetedFeedback);
    state.waiting_for_input = false;
    state.push_message(MessageRole::Tutor, &text);
    state.touch();

    StepPayload::content(Action::ProvideTargetedFeedback, ContentKind::Feedback, text)
        .with_image(image_url)
        .with_audio(audio_url)
}

/// Reacts to a losing streak. Below the hard threshold, mastery decays so
/// easier problems get selected; at the hard threshold the phase steps back
/// and theory is queued for re-presentation.
pub(crate) async fn simplify_instruction(
    state: &mut SessionState,
    curriculum: &Curriculum,
    generator: &dyn ContentGenerator,
    rules: &Rules,
) -> StepPayload {
    let topic_title = curriculum
        .topic(&state.current_topic)
        .map(|t| t.title.clone())
        .unwrap_or_else(|| state.current_topic.clone());

    let text = if state.consecutive_incorrect >= rules.hard_simplify_after {
        state.theory_shown.remove(&state.current_topic);
        state.current_phase = state.current_phase.step_back();
        state.consecutive_incorrect = 0;
        format!(
            "Let's take a step back and revisit {} from the start, with a more hands-on approach.",
            topic_title
        )
    } else {
        state.decay_mastery(rules.mastery_decay, rules.mastery_floor);
        "Let's slow down and try something a bit easier.".to_string()
    };

    state.last_action = Some(Action::SimplifyInstruction);
    state.waiting_for_input = false;
    state.push_message(MessageRole::Tutor, &text);
    state.touch();

    let audio_url = best_effort_audio(generator, &text).await;

    StepPayload::content(Action::SimplifyInstruction, ContentKind::System, text)
        .with_audio(audio_url)
}

/// Advances to the successor topic, or marks the session final when the
/// roadmap is exhausted.
pub(crate) async fn check_advance_topic(
    state: &mut SessionState,
    curriculum: &Curriculum,
    generator: &dyn ContentGenerator,
    rules: &Rules,
) -> StepPayload {
    let Some(next) = curriculum.next_topic(&state.current_topic) else {
        state.last_action = Some(Action::CheckAdvanceTopic);
        state.waiting_for_input = false;
        state.push_message(MessageRole::Tutor, COMPLETION_MESSAGE);
        state.touch();
        let audio_url = best_effort_audio(generator, COMPLETION_MESSAGE).await;
        return StepPayload::content(
            Action::CheckAdvanceTopic,
            ContentKind::System,
            COMPLETION_MESSAGE,
        )
        .with_audio(audio_url)
        .finalizing();
    };
    let next = next.clone();

    state.current_topic = next.id.clone();
    state.current_phase = Phase::Concrete;
    state.consecutive_correct = 0;
    state.consecutive_incorrect = 0;
    state.last_evaluation = None;
    state.last_problem = None;
    state.error_feedback_count = 0;
    state.init_topic_mastery(&next.id, rules.initial_mastery);
    state.last_action = Some(Action::CheckAdvanceTopic);
    state.waiting_for_input = false;

    let vars = template_vars(state, &next);
    let text = match generator
        .generate_templated_text(templates::ADVANCE_TOPIC, &vars)
        .await
    {
        // The topic switch above stays applied either way.
        Ok(text) => text,
        Err(e) => return generation_error(state, e),
    };

    state.push_message(MessageRole::Tutor, &text);
    state.touch();
    let audio_url = best_effort_audio(generator, &text).await;

    StepPayload::content(Action::CheckAdvanceTopic, ContentKind::System, text)
        .with_audio(audio_url)
}
