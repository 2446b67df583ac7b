//! Best-effort extraction of structure from generated text.
//!
//! Generated practice content and evaluation verdicts arrive as free text.
//! This module turns them into structure through explicit fallback chains
//! rather than a single monolithic pattern: strict "answer is N" → trailing
//! number → last number anywhere → raw text.

use crate::session::Evaluation;
use regex::Regex;
use std::sync::LazyLock;

/// Marker separating the problem half from the solution half in a generated
/// practice block.
pub const SOLUTION_DELIMITER: &str = "SOLUTION:";

static ANSWER_IS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:the\s+)?answer\s+is[:\s]+(-?\d+(?:[.,]\d+)?)").unwrap()
});
static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+(?:[.,]\d+)?)\s*[.!)]?\s*$").unwrap());
static ANY_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:[.,]\d+)?").unwrap());

/// Splits a generated practice block into its problem and solution halves.
///
/// When the delimiter is missing the whole block stands in for both halves,
/// so answer extraction can still scan the full text.
pub fn split_problem_solution(text: &str) -> (String, String) {
    match text.split_once(SOLUTION_DELIMITER) {
        Some((problem, solution)) => (problem.trim().to_string(), solution.trim().to_string()),
        None => (text.trim().to_string(), text.trim().to_string()),
    }
}

/// Extracts the final answer from a solution text.
///
/// Fallback chain, first hit wins:
/// 1. an explicit "(the) answer is N" phrase,
/// 2. a number at the end of the text,
/// 3. the last number appearing anywhere,
/// 4. the raw solution text.
pub fn extract_final_answer(solution: &str) -> String {
    if let Some(captures) = ANSWER_IS.captures(solution) {
        return captures[1].to_string();
    }
    if let Some(captures) = TRAILING_NUMBER.captures(solution.trim()) {
        return captures[1].to_string();
    }
    if let Some(found) = ANY_NUMBER.find_iter(solution).last() {
        return found.as_str().to_string();
    }
    solution.trim().to_string()
}

const VERDICT_TOKENS: [(&str, Evaluation); 4] = [
    ("INCORRECT_CONCEPTUAL", Evaluation::IncorrectConceptual),
    ("INCORRECT_CALCULATION", Evaluation::IncorrectCalculation),
    ("CORRECT", Evaluation::Correct),
    ("UNCLEAR", Evaluation::Unclear),
];

fn is_token_boundary(byte: Option<u8>) -> bool {
    match byte {
        Some(b) => !(b.is_ascii_alphanumeric() || b == b'_'),
        None => true,
    }
}

/// Parses an evaluation response into a verdict and the remaining feedback
/// text. The earliest standalone verdict token wins; a missing or
/// unrecognizable token degrades to `Unclear` with the full text as feedback.
pub fn parse_verdict(text: &str) -> (Evaluation, String) {
    let upper = text.to_ascii_uppercase();
    let mut best: Option<(usize, usize, Evaluation)> = None;

    for (token, verdict) in VERDICT_TOKENS {
        let mut search_from = 0;
        while let Some(offset) = upper[search_from..].find(token) {
            let pos = search_from + offset;
            let end = pos + token.len();
            let bounded = is_token_boundary(pos.checked_sub(1).map(|i| upper.as_bytes()[i]))
                && is_token_boundary(upper.as_bytes().get(end).copied());
            if bounded {
                if best.is_none_or(|(p, _, _)| pos < p) {
                    best = Some((pos, end, verdict));
                }
                break;
            }
            search_from = end;
        }
    }

    match best {
        Some((_, end, verdict)) => {
            let feedback = text[end..]
                .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '.' | '-' | ','))
                .trim()
                .to_string();
            (verdict, feedback)
        }
        None => (Evaluation::Unclear, text.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_on_delimiter() {
        let (problem, solution) =
            split_problem_solution("What is 3 + 4?\nSOLUTION: 3 + 4 = 7. The answer is 7.");
        assert_eq!(problem, "What is 3 + 4?");
        assert_eq!(solution, "3 + 4 = 7. The answer is 7.");
    }

    #[test]
    fn missing_delimiter_uses_whole_block() {
        let (problem, solution) = split_problem_solution("  What is 3 + 4? It makes 7.  ");
        assert_eq!(problem, "What is 3 + 4? It makes 7.");
        assert_eq!(solution, problem);
    }

    // Tier 1: explicit "answer is N" phrase.
    #[test]
    fn extracts_explicit_answer_phrase() {
        assert_eq!(
            extract_final_answer("Add 3 and 4 to get 7, so the answer is 7."),
            "7"
        );
        assert_eq!(extract_final_answer("Answer is: -12.5, done"), "-12.5");
    }

    // Tier 2: trailing number.
    #[test]
    fn extracts_trailing_number() {
        assert_eq!(extract_final_answer("First take 10, halve it: 5."), "5");
        assert_eq!(extract_final_answer("Total comes to 42"), "42");
    }

    // Tier 3: last number anywhere.
    #[test]
    fn extracts_last_number_anywhere() {
        assert_eq!(
            extract_final_answer("Take 8 apples, then 13 pears, mix well and serve."),
            "13"
        );
    }

    // Tier 4: raw text when no number exists.
    #[test]
    fn falls_back_to_raw_text() {
        assert_eq!(
            extract_final_answer("  a rhombus with equal diagonals  "),
            "a rhombus with equal diagonals"
        );
    }

    #[test]
    fn parses_leading_verdict_token() {
        let (verdict, feedback) = parse_verdict("CORRECT: Nicely done, 7 is right.");
        assert_eq!(verdict, Evaluation::Correct);
        assert_eq!(feedback, "Nicely done, 7 is right.");
    }

    #[test]
    fn parses_embedded_verdict_token() {
        let (verdict, _) =
            parse_verdict("Verdict: INCORRECT_CALCULATION. The setup was fine.");
        assert_eq!(verdict, Evaluation::IncorrectCalculation);
    }

    #[test]
    fn conceptual_token_is_not_mistaken_for_correct() {
        let (verdict, feedback) = parse_verdict("INCORRECT_CONCEPTUAL - revisit place value.");
        assert_eq!(verdict, Evaluation::IncorrectConceptual);
        assert_eq!(feedback, "revisit place value.");
    }

    #[test]
    fn bare_incorrect_degrades_to_unclear() {
        // "incorrect" alone is not a valid token; its embedded "correct"
        // must not match either.
        let (verdict, _) = parse_verdict("incorrect, try again");
        assert_eq!(verdict, Evaluation::Unclear);
    }

    #[test]
    fn missing_token_degrades_to_unclear_with_raw_feedback() {
        let (verdict, feedback) = parse_verdict("  I could not tell what you meant.  ");
        assert_eq!(verdict, Evaluation::Unclear);
        assert_eq!(feedback, "I could not tell what you meant.");
    }

    #[test]
    fn verdict_is_case_insensitive() {
        let (verdict, _) = parse_verdict("correct! great work");
        assert_eq!(verdict, Evaluation::Correct);
    }
}
