//! Question Normalizer
//!
//! Model output is untrusted text. This module coerces it into a [`Question`]
//! through a layered parser: each tier is tried in turn and the first one to
//! produce a complete, consistent question wins.
//!
//! 1. [`parse_json`]: a JSON object anywhere in the text, after light repair.
//! 2. [`parse_labeled`]: line-oriented text whose options carry `A.`..`D.`
//!    style prefixes, in any order.
//! 3. [`parse_unlabeled`]: line-oriented text whose options carry no usable
//!    labels; labels are assigned by encountered order.
//!
//! The correct answer comes from an indicator phrase ("Correct answer: B",
//! "The answer is B.") and falls back to a lone letter on its own line.

use crate::question::{OptionLabel, Question};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

/// Raised when no tier can build a complete question from the text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedQuestionError {
    #[error("generated text is empty")]
    Empty,
    #[error("no question text found")]
    MissingPrompt,
    #[error("expected 4 options, found {0}")]
    OptionCount(usize),
    #[error("the 4 options are not distinct")]
    DuplicateOptions,
    #[error("no correct answer indicator found")]
    MissingAnswer,
    #[error("correct answer '{0}' does not match any option")]
    AnswerNotAnOption(String),
    #[error("no usable JSON object: {0}")]
    Json(String),
}

type Tier = fn(&str, &str) -> Result<Question, MalformedQuestionError>;

const TIERS: [(&str, Tier); 3] = [
    ("json", parse_json),
    ("labeled", parse_labeled),
    ("unlabeled", parse_unlabeled),
];

/// Runs every tier in order and returns the first question produced.
///
/// When all tiers fail, the error from the most permissive tier is returned.
pub fn normalize(raw: &str, topic: &str) -> Result<Question, MalformedQuestionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MalformedQuestionError::Empty);
    }

    let mut last_error = MalformedQuestionError::Empty;
    for (name, tier) in TIERS {
        match tier(raw, topic) {
            Ok(question) => {
                debug!(tier = name, "Normalized generated question");
                return Ok(question);
            }
            Err(e) => {
                debug!(tier = name, error = %e, "Normalizer tier rejected text");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

// --- Tier 1: JSON ---

static BARE_LETTER_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"("(?:correct_answer|answer|label)"\s*:\s*)([A-Da-d])(\s*[,}\n])"#)
        .expect("valid regex")
});

/// Quotes bare letter values such as `"correct_answer": B`, a common slip in
/// model-written JSON.
fn repair_json(fragment: &str) -> String {
    BARE_LETTER_VALUE
        .replace_all(fragment, r#"$1"$2"$3"#)
        .into_owned()
}

/// Tier 1: parses the outermost `{ ... }` block as a question object.
///
/// Options may be `"A. text"` strings, plain strings, `{label, text}` objects,
/// or a `{"A": ..., "B": ...}` map.
pub fn parse_json(raw: &str, topic: &str) -> Result<Question, MalformedQuestionError> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(MalformedQuestionError::Json("no object braces".into()));
    };
    if end <= start {
        return Err(MalformedQuestionError::Json("no object braces".into()));
    }

    let repaired = repair_json(&raw[start..=end]);
    let value: Value = serde_json::from_str(&repaired)
        .map_err(|e| MalformedQuestionError::Json(e.to_string()))?;

    let prompt = value
        .get("question")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let candidates: Vec<Candidate> = match value.get("options") {
        Some(Value::Array(items)) => items.iter().filter_map(json_option).collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(key, text)| {
                let text = text.as_str()?;
                Some(Candidate {
                    label: key.parse().ok(),
                    text: text.trim().to_string(),
                })
            })
            .collect(),
        _ => Vec::new(),
    };

    let answer = value
        .get("correct_answer")
        .or_else(|| value.get("answer"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    build_question(prompt, candidates, answer.as_deref(), explanation, topic)
}

fn json_option(item: &Value) -> Option<Candidate> {
    match item {
        Value::String(s) => Some(split_label(s)),
        Value::Object(map) => {
            let text = map.get("text").and_then(Value::as_str)?;
            let label = map
                .get("label")
                .and_then(Value::as_str)
                .and_then(|l| l.trim_end_matches(['.', ')']).parse().ok());
            Some(Candidate {
                label,
                text: text.trim().to_string(),
            })
        }
        _ => None,
    }
}

// --- Tiers 2 and 3: line-oriented text ---

static LABELED_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*•]\s*)?(?i:option\s+)?[(\[]?([A-Da-d])\s*(?:[)\].:]|\s-)\s*(\S.*)$")
        .expect("valid regex")
});

static ANSWER_INDICATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i:\b(?:correct\s+answer|right\s+answer|correct\s+option|answer)\b)\s*(?i:is\s*)?[:\-=]?\s*(?i:option\s+)?[(\["']?([A-D])\b"#,
    )
    .expect("valid regex")
});

static STANDALONE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[(\[]?([A-D])[)\].]?$").expect("valid regex"));

static EXPLANATION_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:explanation|reason|why)\s*[:\-]\s*(.*)$").expect("valid regex")
});

static QUESTION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:question(?:\s*\d+)?|q\d*)\s*[:.\-]\s*(.*)$").expect("valid regex")
});

static LIST_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•]|\d+[.)])\s+(\S.*)$").expect("valid regex"));

/// How a single line of model output was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Option(OptionLabel, String),
    Answer(OptionLabel),
    Explanation(String, Option<OptionLabel>),
    Letter(OptionLabel),
    Text(String),
}

fn clean_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.replace("**", "").replace('`', ""))
        .map(|line| line.trim().trim_start_matches('#').trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn classify(line: &str) -> Line {
    if let Some(caps) = LABELED_OPTION.captures(line) {
        let label = caps[1].chars().next().and_then(OptionLabel::from_char);
        if let Some(label) = label {
            return Line::Option(label, caps[2].trim().to_string());
        }
    }
    let indicated = answer_indicator(line);
    if let Some(caps) = EXPLANATION_START.captures(line) {
        return Line::Explanation(caps[1].trim().to_string(), indicated);
    }
    // "Choose the correct answer: A or An?" is a prompt, not an answer.
    if let Some(label) = indicated.filter(|_| !line.ends_with('?')) {
        return Line::Answer(label);
    }
    if let Some(caps) = STANDALONE_LETTER.captures(line) {
        if let Some(label) = caps[1].chars().next().and_then(OptionLabel::from_char) {
            return Line::Letter(label);
        }
    }
    Line::Text(line.to_string())
}

fn answer_indicator(line: &str) -> Option<OptionLabel> {
    ANSWER_INDICATOR
        .captures(line)
        .and_then(|caps| caps[1].chars().next())
        .and_then(OptionLabel::from_char)
}

fn strip_question_prefix(line: &str) -> String {
    QUESTION_PREFIX
        .captures(line)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_else(|| line.to_string())
}

/// Picks the prompt out of the lines seen before the first option. A line
/// that asks something wins over preamble such as "Here is your question:".
fn choose_prompt(lines: &[String]) -> String {
    let stripped: Vec<String> = lines
        .iter()
        .map(|l| strip_question_prefix(l))
        .filter(|l| !l.is_empty())
        .collect();
    match stripped.iter().rev().find(|l| l.contains('?')) {
        Some(line) => line.clone(),
        None => stripped.join(" "),
    }
}

/// Tier 2: options carry label prefixes. When the prefixes form exactly
/// `{A, B, C, D}` they decide placement, so reordered options are restored.
pub fn parse_labeled(raw: &str, topic: &str) -> Result<Question, MalformedQuestionError> {
    let mut prompt_lines = Vec::new();
    let mut candidates = Vec::new();
    let mut residual = Vec::new();
    let mut answered = None;
    let mut hinted = None;
    let mut letter = None;

    for line in clean_lines(raw) {
        match classify(&line) {
            Line::Option(label, text) if candidates.len() < 4 => {
                candidates.push(Candidate {
                    label: Some(label),
                    text,
                });
            }
            Line::Option(..) => residual.push(line),
            Line::Answer(label) => {
                answered.get_or_insert(label);
            }
            Line::Explanation(text, label) => {
                if let Some(label) = label {
                    hinted.get_or_insert(label);
                }
                residual.push(text);
            }
            Line::Letter(label) => {
                letter.get_or_insert(label);
            }
            Line::Text(text) if candidates.is_empty() => prompt_lines.push(text),
            Line::Text(text) => residual.push(text),
        }
    }

    if candidates.is_empty() {
        return Err(MalformedQuestionError::OptionCount(0));
    }

    let answer = answered.or(hinted).or(letter).map(|l| l.to_string());
    build_question(
        &choose_prompt(&prompt_lines),
        candidates,
        answer.as_deref(),
        residual.join(" "),
        topic,
    )
}

/// Tier 3: the first line is the prompt and the next four unclaimed lines
/// are the options, labeled A–D in the order they appear. Any label, bullet
/// or numbering prefix is dropped.
pub fn parse_unlabeled(raw: &str, topic: &str) -> Result<Question, MalformedQuestionError> {
    let mut prompt = None;
    let mut options = Vec::new();
    let mut residual = Vec::new();
    let mut answered = None;
    let mut hinted = None;
    let mut letter = None;
    let mut in_explanation = false;

    for line in clean_lines(raw) {
        match classify(&line) {
            Line::Answer(label) => {
                answered.get_or_insert(label);
            }
            Line::Explanation(text, label) => {
                if let Some(label) = label {
                    hinted.get_or_insert(label);
                }
                in_explanation = true;
                residual.push(text);
            }
            Line::Letter(label) => {
                letter.get_or_insert(label);
            }
            Line::Option(_, text) | Line::Text(text) => {
                if prompt.is_none() {
                    prompt = Some(strip_question_prefix(&line));
                } else if options.len() < 4 && !in_explanation {
                    options.push(Candidate {
                        label: None,
                        text: strip_list_prefix(&text),
                    });
                } else {
                    residual.push(line);
                }
            }
        }
    }

    let answer = answered.or(hinted).or(letter).map(|l| l.to_string());
    build_question(
        prompt.as_deref().unwrap_or_default(),
        options,
        answer.as_deref(),
        residual.join(" "),
        topic,
    )
}

fn strip_list_prefix(text: &str) -> String {
    LIST_PREFIX
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_else(|| text.trim().to_string())
}

// --- Assembly ---

/// An option as found in the text, with the label it claimed, if any.
#[derive(Debug, Clone)]
struct Candidate {
    label: Option<OptionLabel>,
    text: String,
}

fn split_label(raw: &str) -> Candidate {
    let raw = raw.trim();
    match LABELED_OPTION.captures(raw) {
        Some(caps) => Candidate {
            label: caps[1].chars().next().and_then(OptionLabel::from_char),
            text: caps[2].trim().to_string(),
        },
        None => Candidate {
            label: None,
            text: raw.to_string(),
        },
    }
}

/// Orders options by their labels when those labels are exactly A–D, and
/// by encounter order otherwise.
fn place_options(candidates: Vec<Candidate>) -> [String; 4] {
    let mut labels: Vec<OptionLabel> = candidates.iter().filter_map(|c| c.label).collect();
    labels.sort();
    labels.dedup();
    let by_label = labels.len() == 4;

    let mut placed: [String; 4] = Default::default();
    for (position, candidate) in candidates.into_iter().enumerate() {
        let slot = match candidate.label {
            Some(label) if by_label => label.index(),
            _ => position,
        };
        placed[slot] = candidate.text;
    }
    placed
}

fn resolve_answer(token: &str, options: &[String; 4]) -> Result<OptionLabel, MalformedQuestionError> {
    let trimmed = token
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '(' | ')' | '[' | ']' | '.' | ':'))
        .trim();
    if trimmed.is_empty() {
        return Err(MalformedQuestionError::MissingAnswer);
    }
    if let Ok(label) = trimmed.parse::<OptionLabel>() {
        return Ok(label);
    }

    let candidate = split_label(trimmed);
    if let Some(label) = candidate.label {
        return Ok(label);
    }
    options
        .iter()
        .position(|option| option.eq_ignore_ascii_case(&candidate.text))
        .and_then(OptionLabel::from_index)
        .ok_or_else(|| MalformedQuestionError::AnswerNotAnOption(trimmed.to_string()))
}

fn build_question(
    prompt: &str,
    candidates: Vec<Candidate>,
    answer: Option<&str>,
    explanation: String,
    topic: &str,
) -> Result<Question, MalformedQuestionError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(MalformedQuestionError::MissingPrompt);
    }

    let candidates: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| !c.text.is_empty())
        .collect();
    if candidates.len() != 4 {
        return Err(MalformedQuestionError::OptionCount(candidates.len()));
    }

    let options = place_options(candidates);
    let mut seen: Vec<String> = options.iter().map(|o| o.to_lowercase()).collect();
    seen.sort();
    seen.dedup();
    if seen.len() != 4 {
        return Err(MalformedQuestionError::DuplicateOptions);
    }

    let correct = resolve_answer(answer.ok_or(MalformedQuestionError::MissingAnswer)?, &options)?;

    Ok(Question {
        prompt: prompt.to_string(),
        options,
        correct,
        explanation: explanation.trim().to_string(),
        topic: topic.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "Grammar - Verb Tenses";

    #[test]
    fn json_tier_reads_the_requested_format() {
        let raw = r#"Sure! Here is your question:
{
  "question": "What is the past tense of 'go'?",
  "options": ["A. Goed", "B. Went", "C. Gone", "D. Going"],
  "correct_answer": "B",
  "explanation": "The irregular past tense of 'go' is 'went'."
}
Good luck!"#;

        let q = normalize(raw, TOPIC).unwrap();
        assert_eq!(q.prompt, "What is the past tense of 'go'?");
        assert_eq!(q.options, ["Goed", "Went", "Gone", "Going"]);
        assert_eq!(q.correct, OptionLabel::B);
        assert_eq!(q.topic, TOPIC);
        assert!(q.explanation.contains("went"));
    }

    #[test]
    fn json_tier_repairs_bare_letters_and_object_options() {
        let raw = r#"{
  "question": "Which word is a synonym for 'happy'?",
  "options": [
    {"label": A, "text": "Sad"},
    {"label": B, "text": "Angry"},
    {"label": C, "text": "Joyful"},
    {"label": D, "text": "Tired"}
  ],
  "correct_answer": C,
  "explanation": "'Joyful' means full of joy."
}"#;

        let q = parse_json(raw, TOPIC).unwrap();
        assert_eq!(q.options[2], "Joyful");
        assert_eq!(q.correct, OptionLabel::C);
    }

    #[test]
    fn json_tier_accepts_answer_given_as_option_text() {
        let raw = r#"{"question": "Plural of 'child'?",
            "options": ["Childs", "Childes", "Children", "Childrens"],
            "correct_answer": "Children", "explanation": ""}"#;

        let q = parse_json(raw, TOPIC).unwrap();
        assert_eq!(q.correct, OptionLabel::C);
    }

    #[test]
    fn json_tier_rejects_answer_outside_the_options() {
        let raw = r#"{"question": "Q?", "options": ["A. w", "B. x", "C. y", "D. z"],
            "correct_answer": "E"}"#;

        assert_eq!(
            parse_json(raw, TOPIC),
            Err(MalformedQuestionError::AnswerNotAnOption("E".into()))
        );
    }

    #[test]
    fn json_tier_needs_braces() {
        assert!(matches!(
            parse_json("no json here", TOPIC),
            Err(MalformedQuestionError::Json(_))
        ));
    }

    #[test]
    fn labeled_tier_handles_answer_before_or_after_explanation() {
        let answer_last = "What is the past tense of 'go'?\n\
            A. Goed\nB. Went\nC. Gone\nD. Going\n\
            Explanation: 'Went' is irregular.\n\
            Correct answer: B";
        let answer_first = "What is the past tense of 'go'?\n\
            A. Goed\nB. Went\nC. Gone\nD. Going\n\
            The answer is B.\n\
            Explanation: 'Went' is irregular.";

        for raw in [answer_last, answer_first] {
            let q = parse_labeled(raw, TOPIC).unwrap();
            assert_eq!(q.correct, OptionLabel::B);
            assert_eq!(q.explanation, "'Went' is irregular.");
            assert_eq!(q.options[1], "Went");
        }
    }

    #[test]
    fn answer_line_wins_over_letters_named_in_the_explanation() {
        let raw = "What is the past tense of 'go'?\n\
            A. Goed\nB. Went\nC. Gone\nD. Going\n\
            Explanation: Answer A is a common learner mistake; 'went' is irregular.\n\
            Correct answer: B";
        let q = normalize(raw, TOPIC).unwrap();
        assert_eq!(q.correct, OptionLabel::B);

        let unlabeled = "What is the past tense of 'go'?\nGoed\nWent\nGone\nGoing\n\
            Explanation: Answer A is a common learner mistake.\n\
            The answer is B.";
        assert_eq!(parse_unlabeled(unlabeled, TOPIC).unwrap().correct, OptionLabel::B);
    }

    #[test]
    fn explanation_indicator_beats_a_standalone_letter() {
        let raw = "Which is a synonym for 'happy'?\n\
            A. Sad\nB. Angry\nC. Joyful\nD. Tired\n\
            D\n\
            Explanation: the correct answer is C, 'joyful'.";
        assert_eq!(parse_labeled(raw, TOPIC).unwrap().correct, OptionLabel::C);
    }

    #[test]
    fn prompt_mentioning_the_correct_answer_is_kept() {
        let raw = "Choose the correct answer: A or An?\n\
            A. ___ apple\nB. ___ university\nC. ___ hour\nD. ___ honest man\n\
            Correct answer: B";
        let q = parse_labeled(raw, TOPIC).unwrap();
        assert_eq!(q.prompt, "Choose the correct answer: A or An?");
        assert_eq!(q.correct, OptionLabel::B);
    }

    #[test]
    fn labeled_tier_tolerates_punctuation_and_reordering() {
        let raw = "Question 3: Which sentence is correct?\n\
            (C) I have went to Paris.\n\
            b) I went to Paris last year.\n\
            **A.** I have been to Paris last year.\n\
            D - I had been going to Paris last year.\n\
            Answer: (B)";

        let q = parse_labeled(raw, TOPIC).unwrap();
        assert_eq!(q.prompt, "Which sentence is correct?");
        assert_eq!(q.options[0], "I have been to Paris last year.");
        assert_eq!(q.options[1], "I went to Paris last year.");
        assert_eq!(q.options[2], "I have went to Paris.");
        assert_eq!(q.correct, OptionLabel::B);
    }

    #[test]
    fn labeled_tier_skips_preamble() {
        let raw = "Here is a new question for you:\n\
            What is the correct spelling?\n\
            A. Accomodate\nB. Acommodate\nC. Accommodate\nD. Acomodate\n\
            Correct answer: C";

        let q = parse_labeled(raw, TOPIC).unwrap();
        assert_eq!(q.prompt, "What is the correct spelling?");
    }

    #[test]
    fn standalone_letter_is_the_fallback_answer() {
        let raw = "Which idiom means to go to sleep?\n\
            A. Hit the road\nB. Hit the hay\nC. Hit the books\nD. Hit the roof\n\
            B\n\
            'Hit the hay' means going to bed.";

        let q = normalize(raw, TOPIC).unwrap();
        assert_eq!(q.correct, OptionLabel::B);
        assert_eq!(q.explanation, "'Hit the hay' means going to bed.");
    }

    #[test]
    fn indicator_wins_over_standalone_letter() {
        let raw = "Pick one?\nA. w\nB. x\nC. y\nD. z\nA\nThe correct answer is D";
        assert_eq!(parse_labeled(raw, TOPIC).unwrap().correct, OptionLabel::D);
    }

    #[test]
    fn unlabeled_tier_assigns_labels_by_order() {
        let raw = "Which word is an antonym of 'ancient'?\n\
            - Old\n- Modern\n- Antique\n- Aged\n\
            Correct answer: B\n\
            'Modern' is the opposite of 'ancient'.";

        let q = normalize(raw, TOPIC).unwrap();
        assert_eq!(q.options, ["Old", "Modern", "Antique", "Aged"]);
        assert_eq!(q.correct, OptionLabel::B);
        assert_eq!(q.explanation, "'Modern' is the opposite of 'ancient'.");
    }

    #[test]
    fn unlabeled_tier_recovers_partially_labeled_options() {
        let raw = "Which is a homophone of 'flour'?\n\
            A. Floor\nFlower\nC. Flair\nD. Flout\n\
            The answer is B.";

        assert!(parse_labeled(raw, TOPIC).is_err());
        let q = normalize(raw, TOPIC).unwrap();
        assert_eq!(q.options, ["Floor", "Flower", "Flair", "Flout"]);
        assert_eq!(q.correct, OptionLabel::B);
    }

    #[test]
    fn fails_with_too_few_options() {
        let raw = "Question?\nA. one\nB. two\nC. three\nAnswer: A";
        assert_eq!(
            parse_labeled(raw, TOPIC),
            Err(MalformedQuestionError::OptionCount(3))
        );
        assert!(normalize(raw, TOPIC).is_err());
    }

    #[test]
    fn fails_with_duplicate_options() {
        let raw = "Question?\nA. same\nB. Same\nC. three\nD. four\nAnswer: A";
        assert_eq!(
            parse_labeled(raw, TOPIC),
            Err(MalformedQuestionError::DuplicateOptions)
        );
    }

    #[test]
    fn fails_without_any_answer() {
        let raw = "Question?\nA. one\nB. two\nC. three\nD. four\nNo idea.";
        assert_eq!(
            normalize(raw, TOPIC),
            Err(MalformedQuestionError::MissingAnswer)
        );
    }

    #[test]
    fn empty_text_is_malformed() {
        assert_eq!(normalize("  \n ", TOPIC), Err(MalformedQuestionError::Empty));
    }

    #[test]
    fn answer_indicator_ignores_lowercase_articles() {
        assert_eq!(answer_indicator("The answer is a verb."), None);
        assert_eq!(answer_indicator("Correct Answer - C"), Some(OptionLabel::C));
        assert_eq!(
            answer_indicator("The correct answer is option D."),
            Some(OptionLabel::D)
        );
    }
}
