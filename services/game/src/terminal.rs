//! Terminal rendering and input parsing.
//!
//! Everything here is pure: renderers return strings and parsers return
//! typed values, so the runner owns all actual I/O.

use colored::Colorize;
use millionaire_core::session::AnswerRecord;
use millionaire_core::{Outcome, Question, Response, Session};
use std::path::Path;

const WIDE_RULE: usize = 80;
const RULE: usize = 60;

/// Input the current prompt cannot accept. The message is shown to the
/// player before asking again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidInputError {
    #[error("Invalid input. Please enter A, B, C, D, or EXIT.")]
    Answer(String),
    #[error("Please answer Y or N.")]
    YesNo(String),
    #[error("Invalid choice, please enter 1, 2 or 3.")]
    MenuChoice(String),
    #[error("Invalid choice, please enter a number from 1 to {max}.")]
    Selection { input: String, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    NewGame,
    LoadGame,
    Exit,
}

pub fn parse_menu_choice(input: &str) -> Result<MenuChoice, InvalidInputError> {
    match input.trim() {
        "1" => Ok(MenuChoice::NewGame),
        "2" => Ok(MenuChoice::LoadGame),
        "3" => Ok(MenuChoice::Exit),
        other => Err(InvalidInputError::MenuChoice(other.to_string())),
    }
}

/// An option label or `EXIT`, case-insensitive.
pub fn parse_answer(input: &str) -> Result<Response, InvalidInputError> {
    input
        .parse()
        .map_err(|_| InvalidInputError::Answer(input.trim().to_string()))
}

pub fn parse_yes_no(input: &str) -> Result<bool, InvalidInputError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Ok(true),
        "n" | "no" => Ok(false),
        other => Err(InvalidInputError::YesNo(other.to_string())),
    }
}

/// A 1-based pick from a list of `count` entries, returned 0-based. Blank
/// input means "go back".
pub fn parse_selection(input: &str, count: usize) -> Result<Option<usize>, InvalidInputError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Ok(Some(n - 1)),
        _ => Err(InvalidInputError::Selection {
            input: trimmed.to_string(),
            max: count,
        }),
    }
}

/// Blank names become `Player`.
pub fn player_name_or_default(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        "Player".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `1234567` becomes `$1,234,567`.
pub fn format_money(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("${}", grouped)
}

pub fn render_welcome() -> String {
    format!(
        "\n{}\n{}\n{}\n{}\n",
        "=".repeat(WIDE_RULE),
        "WHO WANTS TO BE A MILLIONAIRE - ENGLISH LANGUAGE EDITION"
            .yellow()
            .on_blue()
            .bold(),
        "Improve your English while winning virtual millions!".cyan(),
        "=".repeat(WIDE_RULE)
    )
}

pub fn render_menu() -> String {
    format!(
        "{}\n{}\n{}",
        "1. Start New Game".green(),
        "2. Load Saved Game".green(),
        "3. Exit".green()
    )
}

/// Player, money and the value of the next question.
pub fn render_status(session: &Session) -> String {
    let mut lines = vec![
        "-".repeat(RULE),
        format!("Player: {}", session.player_name()).yellow().to_string(),
        format!("Current Money: {}", format_money(session.current_money()))
            .yellow()
            .to_string(),
    ];
    if let Some(prize) = session.next_prize() {
        lines.push(
            format!("Next Question Worth: {}", format_money(prize))
                .yellow()
                .to_string(),
        );
    }
    lines.push("-".repeat(RULE));
    format!("\n{}\n", lines.join("\n"))
}

pub fn render_question(question: &Question, prize: u64) -> String {
    let mut lines = vec![
        "=".repeat(RULE),
        format!("Question for {}", format_money(prize)).yellow().to_string(),
        format!("Topic: {}", question.topic).yellow().to_string(),
        String::new(),
        question.prompt.green().to_string(),
        String::new(),
    ];
    lines.extend(
        question
            .formatted_options()
            .into_iter()
            .map(|option| option.cyan().to_string()),
    );
    lines.push("=".repeat(RULE));
    format!("\n{}\n", lines.join("\n"))
}

/// Feedback for an answered question, including the fallback amount after a
/// miss.
pub fn render_answer_result(record: &AnswerRecord) -> String {
    let question = &record.question;
    let mut lines = Vec::new();
    if record.correct {
        lines.push(
            format!("CORRECT! You now have {}!", format_money(record.amount_won))
                .green()
                .bold()
                .to_string(),
        );
    } else {
        lines.push("I'm sorry, that's incorrect.".red().bold().to_string());
        lines.push(
            format!(
                "The correct answer was {}. {}",
                question.correct,
                question.option(question.correct)
            )
            .red()
            .to_string(),
        );
    }
    if !question.explanation.is_empty() {
        lines.push(String::new());
        lines.push("EXPLANATION:".white().on_blue().to_string());
        lines.push(question.explanation.clone());
    }
    if !record.correct {
        lines.push(String::new());
        lines.push(
            format!("You fall back to {}", format_money(record.amount_won))
                .yellow()
                .to_string(),
        );
    }
    format!("\n{}", lines.join("\n"))
}

/// One line per answered question: `n. ✓ $amount - topic`.
pub fn render_history(records: &[AnswerRecord]) -> String {
    records
        .iter()
        .map(|record| {
            let mark = if record.correct {
                "✓".green()
            } else {
                "✗".red()
            };
            let exited = if record.response == Response::Exit {
                " (exited)"
            } else {
                ""
            };
            format!(
                "{}. {} {} - {}{}",
                record.question_num,
                mark,
                format_money(record.amount_won),
                record.question.topic,
                exited
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shown after a session is loaded.
pub fn render_resume_summary(session: &Session, path: &Path) -> String {
    let mut out = format!(
        "\n{}\n{}",
        format!("Game session loaded from {}", path.display()).green(),
        format!(
            "Player: {}, Money: {}",
            session.player_name(),
            format_money(session.current_money())
        )
        .yellow()
    );
    if !session.history().is_empty() {
        out.push_str(&format!(
            "\n\n{}\n{}",
            "Questions History:".cyan(),
            render_history(session.history())
        ));
    }
    if let Some(outcome) = session.outcome() {
        out.push_str(&format!(
            "\n\n{}",
            format!("This game is already over: the player {}.", outcome).yellow()
        ));
    }
    out
}

/// Numbered list of saved session files, or a note that there are none.
pub fn render_session_list(paths: &[impl AsRef<Path>]) -> String {
    if paths.is_empty() {
        return "No saved sessions found.".yellow().to_string();
    }
    let mut lines = vec!["Saved Game Sessions:".cyan().to_string()];
    for (i, path) in paths.iter().enumerate() {
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.as_ref().display().to_string());
        lines.push(format!("{}. {}", i + 1, name));
    }
    format!("\n{}", lines.join("\n"))
}

pub fn render_game_over(session: &Session) -> String {
    let money = session.current_money();
    let headline = match session.outcome() {
        Some(Outcome::Completed) => format!(
            "Congratulations! You answered every question and won {}!",
            format_money(money)
        ),
        _ if money > 0 => format!("Game Over! You won {}!", format_money(money)),
        _ => "Game Over! Better luck next time!".to_string(),
    };
    format!("\n{}", headline.yellow().bold())
}

#[cfg(test)]
mod tests {
    use super::*;
    use millionaire_core::{GameConfig, OptionLabel};
    use std::sync::Arc;

    fn plain() {
        colored::control::set_override(false);
    }

    fn question() -> Question {
        Question {
            prompt: "Which word is a synonym for 'happy'?".into(),
            options: ["Sad".into(), "Angry".into(), "Joyful".into(), "Tired".into()],
            correct: OptionLabel::C,
            explanation: "'Joyful' means feeling great happiness.".into(),
            topic: "Vocabulary - Synonyms".into(),
        }
    }

    fn record(correct: bool, amount_won: u64) -> AnswerRecord {
        AnswerRecord {
            question_num: 1,
            question: question(),
            response: Response::Option(if correct { OptionLabel::C } else { OptionLabel::A }),
            correct,
            amount_won,
        }
    }

    #[test]
    fn money_is_grouped_in_thousands() {
        assert_eq!(format_money(0), "$0");
        assert_eq!(format_money(500), "$500");
        assert_eq!(format_money(1_000), "$1,000");
        assert_eq!(format_money(32_000), "$32,000");
        assert_eq!(format_money(1_000_000), "$1,000,000");
    }

    #[test]
    fn answers_accept_labels_and_exit() {
        assert_eq!(parse_answer(" b "), Ok(Response::Option(OptionLabel::B)));
        assert_eq!(parse_answer("Exit"), Ok(Response::Exit));
        assert_eq!(
            parse_answer("E"),
            Err(InvalidInputError::Answer("E".to_string()))
        );
        assert!(parse_answer("").is_err());
    }

    #[test]
    fn menu_and_yes_no_parsing() {
        assert_eq!(parse_menu_choice("2"), Ok(MenuChoice::LoadGame));
        assert!(parse_menu_choice("4").is_err());
        assert_eq!(parse_yes_no("Y"), Ok(true));
        assert_eq!(parse_yes_no("no"), Ok(false));
        assert!(parse_yes_no("maybe").is_err());
    }

    #[test]
    fn selection_is_one_based_and_blank_goes_back() {
        assert_eq!(parse_selection("", 3), Ok(None));
        assert_eq!(parse_selection("1", 3), Ok(Some(0)));
        assert_eq!(parse_selection("3", 3), Ok(Some(2)));
        assert_eq!(
            parse_selection("4", 3),
            Err(InvalidInputError::Selection {
                input: "4".into(),
                max: 3
            })
        );
        assert!(parse_selection("two", 3).is_err());
    }

    #[test]
    fn blank_player_name_defaults() {
        assert_eq!(player_name_or_default("  "), "Player");
        assert_eq!(player_name_or_default(" Ada "), "Ada");
    }

    #[test]
    fn question_rendering_lists_labeled_options() {
        plain();
        let rendered = render_question(&question(), 1_000);
        assert!(rendered.contains("Question for $1,000"));
        assert!(rendered.contains("Topic: Vocabulary - Synonyms"));
        assert!(rendered.contains("C. Joyful"));
    }

    #[test]
    fn miss_shows_correct_answer_and_fallback() {
        plain();
        let rendered = render_answer_result(&record(false, 0));
        assert!(rendered.contains("The correct answer was C. Joyful"));
        assert!(rendered.contains("You fall back to $0"));
        assert!(rendered.contains("EXPLANATION:"));
    }

    #[test]
    fn history_lines_mark_results() {
        plain();
        let rendered = render_history(&[record(true, 100)]);
        assert_eq!(rendered, "1. ✓ $100 - Vocabulary - Synonyms");
    }

    #[test]
    fn status_shows_next_prize() {
        plain();
        let session = Session::start_at(
            "Ada",
            "llama3.2",
            Arc::new(GameConfig::default()),
            "20250101-090000".into(),
        );
        let rendered = render_status(&session);
        assert!(rendered.contains("Current Money: $0"));
        assert!(rendered.contains("Next Question Worth: $100"));
    }

    #[test]
    fn empty_session_list_says_so() {
        plain();
        let none: Vec<std::path::PathBuf> = Vec::new();
        assert_eq!(render_session_list(&none), "No saved sessions found.");
        let listed = render_session_list(&[Path::new("/tmp/Ada-20250101-090000.json")]);
        assert!(listed.contains("1. Ada-20250101-090000.json"));
    }
}
