//! Game Session State Machine
//!
//! Owns one player's run: ladder position, money, answer history, the dedup
//! ledger and the current phase. Every transition validates the phase first
//! and leaves the session untouched when it is rejected.
//!
//! ```text
//! AwaitingQuestion --issue_question--> AwaitingAnswer
//! AwaitingAnswer --correct--> AwaitingContinueDecision | Finished(Completed)
//! AwaitingAnswer --wrong--> Finished(Busted)
//! AwaitingContinueDecision --continue--> AwaitingQuestion
//! AwaitingContinueDecision --cash out--> Finished(WalkedAway)
//! any non-terminal --exit--> Finished(ExplicitExit)
//! any non-terminal --abort--> Finished(Aborted)
//! ```

use crate::config::GameConfig;
use crate::ledger::{DedupLedger, normalize_question_text};
use crate::question::{OptionLabel, Question, Response};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// `strftime` pattern for session timestamps, e.g. `20250101-093000`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// How a finished session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    WalkedAway,
    Busted,
    Completed,
    ExplicitExit,
    /// No question could be produced and the game could not go on.
    Aborted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Outcome::WalkedAway => "walked away",
            Outcome::Busted => "answered incorrectly",
            Outcome::Completed => "won the top prize",
            Outcome::ExplicitExit => "exited",
            Outcome::Aborted => "stopped early",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    AwaitingQuestion,
    AwaitingAnswer(Question),
    AwaitingContinueDecision,
    Finished(Outcome),
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::AwaitingQuestion => "awaiting a question",
            Phase::AwaitingAnswer(_) => "awaiting an answer",
            Phase::AwaitingContinueDecision => "awaiting a continue decision",
            Phase::Finished(_) => "finished",
        }
    }
}

/// One answered (or exited) question, snapshotted when it was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    /// 1-based position in the history.
    pub question_num: u32,
    pub question: Question,
    pub response: Response,
    pub correct: bool,
    /// Money held immediately after this answer.
    pub amount_won: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("cannot {operation} while {phase}")]
    InvalidTransition {
        operation: &'static str,
        phase: &'static str,
    },
    #[error("question was already asked this session: {0}")]
    DuplicateQuestion(String),
}

/// A stored session that cannot be resumed. Never repaired automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CorruptSessionError(pub String);

fn corrupt(message: impl Into<String>) -> CorruptSessionError {
    CorruptSessionError(message.into())
}

/// Plain data view of a session, exchanged with the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub player_name: String,
    pub created_at: String,
    pub model_id: String,
    /// Absent in documents written before the index was stored.
    pub ladder_index: Option<usize>,
    pub final_money: u64,
    pub history: Vec<AnswerRecord>,
    pub game_over: bool,
    /// Absent in documents written before the outcome was stored.
    pub outcome: Option<Outcome>,
    pub used_topics: BTreeSet<String>,
    pub used_questions: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct Session {
    config: Arc<GameConfig>,
    player_name: String,
    created_at: String,
    model_id: String,
    ladder_index: usize,
    current_money: u64,
    history: Vec<AnswerRecord>,
    ledger: DedupLedger,
    phase: Phase,
}

impl Session {
    /// Starts a fresh session at rung 0, stamped with the local time.
    pub fn start_new(player_name: &str, model_id: &str, config: Arc<GameConfig>) -> Self {
        let created_at = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::start_at(player_name, model_id, config, created_at)
    }

    /// Like [`Session::start_new`] with an explicit timestamp.
    pub fn start_at(
        player_name: &str,
        model_id: &str,
        config: Arc<GameConfig>,
        created_at: String,
    ) -> Self {
        info!(player = player_name, model = model_id, "Starting new session");
        Self {
            current_money: config.value_at(0),
            config,
            player_name: player_name.to_string(),
            created_at,
            model_id: model_id.to_string(),
            ladder_index: 0,
            history: Vec::new(),
            ledger: DedupLedger::default(),
            phase: Phase::AwaitingQuestion,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn ladder_index(&self) -> usize {
        self.ladder_index
    }

    pub fn current_money(&self) -> u64 {
        self.current_money
    }

    pub fn history(&self) -> &[AnswerRecord] {
        &self.history
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.phase {
            Phase::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn pending_question(&self) -> Option<&Question> {
        match &self.phase {
            Phase::AwaitingAnswer(question) => Some(question),
            _ => None,
        }
    }

    /// Amount the next correct answer would bring, if the game can go on.
    pub fn next_prize(&self) -> Option<u64> {
        if self.is_over() || self.ladder_index >= self.config.final_index() {
            return None;
        }
        Some(self.config.value_at(self.ladder_index + 1))
    }

    pub(crate) fn invalid_transition(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            operation,
            phase: self.phase.name(),
        }
    }

    /// Presents `question` to the player and records its topic and text in
    /// the ledger.
    pub fn issue_question(&mut self, question: Question) -> Result<&Question, SessionError> {
        if self.phase != Phase::AwaitingQuestion {
            return Err(self.invalid_transition("issue a question"));
        }
        if self.ledger.is_duplicate_question(&question.prompt) {
            return Err(SessionError::DuplicateQuestion(question.prompt));
        }

        self.ledger.register_topic(&question.topic);
        self.ledger.register_question(&question.prompt);
        info!(
            rung = self.ladder_index + 1,
            topic = %question.topic,
            "Issued question"
        );
        self.phase = Phase::AwaitingAnswer(question);
        self.pending_question()
            .ok_or_else(|| self.invalid_transition("issue a question"))
    }

    fn take_pending_question(&mut self) -> Option<Question> {
        match std::mem::replace(&mut self.phase, Phase::AwaitingQuestion) {
            Phase::AwaitingAnswer(question) => Some(question),
            other => {
                self.phase = other;
                None
            }
        }
    }

    /// Applies the player's choice for the pending question.
    ///
    /// A correct answer climbs one rung; reaching the top rung completes the
    /// game. A wrong answer drops to the highest milestone at or below the
    /// rung the question was asked from, or to nothing.
    pub fn submit_answer(&mut self, label: OptionLabel) -> Result<&AnswerRecord, SessionError> {
        let question = self
            .take_pending_question()
            .ok_or_else(|| self.invalid_transition("submit an answer"))?;

        let asked_from = self.ladder_index;
        let correct = label == question.correct;
        if correct {
            self.ladder_index = asked_from + 1;
            self.current_money = self.config.value_at(self.ladder_index);
            self.phase = if self.ladder_index == self.config.final_index() {
                Phase::Finished(Outcome::Completed)
            } else {
                Phase::AwaitingContinueDecision
            };
        } else {
            self.ladder_index = self.config.milestone_at_or_below(asked_from).unwrap_or(0);
            self.current_money = self.config.fallback_money(asked_from);
            self.phase = Phase::Finished(Outcome::Busted);
        }

        info!(
            answer = %label,
            correct,
            money = self.current_money,
            phase = self.phase.name(),
            "Answer submitted"
        );

        let record = AnswerRecord {
            question_num: self.history.len() as u32 + 1,
            question,
            response: Response::Option(label),
            correct,
            amount_won: self.current_money,
        };
        self.history.push(record);
        Ok(&self.history[self.history.len() - 1])
    }

    pub fn continue_playing(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::AwaitingContinueDecision {
            return Err(self.invalid_transition("continue"));
        }
        self.phase = Phase::AwaitingQuestion;
        Ok(())
    }

    /// Walks away with the current rung's money.
    pub fn cash_out(&mut self) -> Result<u64, SessionError> {
        if self.phase != Phase::AwaitingContinueDecision {
            return Err(self.invalid_transition("cash out"));
        }
        self.current_money = self.config.value_at(self.ladder_index);
        self.phase = Phase::Finished(Outcome::WalkedAway);
        info!(money = self.current_money, "Player cashed out");
        Ok(self.current_money)
    }

    /// Ends the session at the player's request and returns the money kept.
    ///
    /// An unanswered question is recorded with an `EXIT` response. Calling
    /// this on a finished session changes nothing.
    pub fn request_exit(&mut self) -> u64 {
        if self.is_over() {
            return self.current_money;
        }

        let pending = self.take_pending_question();
        self.current_money = self.config.value_at(self.ladder_index);
        if let Some(question) = pending {
            let record = AnswerRecord {
                question_num: self.history.len() as u32 + 1,
                question,
                response: Response::Exit,
                correct: false,
                amount_won: self.current_money,
            };
            self.history.push(record);
        }
        self.phase = Phase::Finished(Outcome::ExplicitExit);
        info!(money = self.current_money, "Player exited");
        self.current_money
    }

    /// Ends the session because play cannot continue. A pending question is
    /// discarded without a record.
    pub fn abort(&mut self, reason: &str) -> u64 {
        if self.is_over() {
            return self.current_money;
        }

        self.take_pending_question();
        self.current_money = self.config.value_at(self.ladder_index);
        self.phase = Phase::Finished(Outcome::Aborted);
        warn!(reason, money = self.current_money, "Session aborted");
        self.current_money
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            player_name: self.player_name.clone(),
            created_at: self.created_at.clone(),
            model_id: self.model_id.clone(),
            ladder_index: Some(self.ladder_index),
            final_money: self.current_money,
            history: self.history.clone(),
            game_over: self.is_over(),
            outcome: self.outcome(),
            used_topics: self.ledger.used_topics().clone(),
            used_questions: self.ledger.used_questions().clone(),
        }
    }

    /// Rebuilds a session from stored data.
    ///
    /// The history must describe a legal run under `config`: consecutive
    /// numbering, only the last record may be a miss or an exit, and every
    /// recorded amount must match the ladder. An unfinished session resumes
    /// waiting for its next question; a finished one is read-only.
    pub fn resume(
        snapshot: SessionSnapshot,
        config: Arc<GameConfig>,
    ) -> Result<Self, CorruptSessionError> {
        if snapshot.player_name.trim().is_empty() {
            return Err(corrupt("player name is empty"));
        }

        let mut seen = HashSet::new();
        for (i, record) in snapshot.history.iter().enumerate() {
            if record.question_num as usize != i + 1 {
                return Err(corrupt(format!(
                    "record {} is numbered {}",
                    i + 1,
                    record.question_num
                )));
            }
            let answered_correctly = record.response == Response::Option(record.question.correct);
            if record.correct != answered_correctly {
                return Err(corrupt(format!(
                    "question {} is marked {} but the answer says otherwise",
                    record.question_num,
                    if record.correct { "correct" } else { "incorrect" }
                )));
            }
            if !record.correct && i + 1 != snapshot.history.len() {
                return Err(corrupt(format!(
                    "question {} ended the game but more questions follow",
                    record.question_num
                )));
            }
            if !seen.insert(normalize_question_text(&record.question.prompt)) {
                return Err(corrupt(format!(
                    "question {} repeats an earlier question",
                    record.question_num
                )));
            }
        }

        let climbed = snapshot.history.iter().filter(|r| r.correct).count();
        if climbed > config.final_index() {
            return Err(corrupt(format!(
                "{} correct answers exceed a ladder of {} rungs",
                climbed,
                config.final_index()
            )));
        }
        for (i, record) in snapshot.history.iter().filter(|r| r.correct).enumerate() {
            let expected = config.value_at(i + 1);
            if record.amount_won != expected {
                return Err(corrupt(format!(
                    "question {} records ${} but the ladder pays ${}",
                    record.question_num, record.amount_won, expected
                )));
            }
        }

        let last_miss = snapshot.history.last().filter(|r| !r.correct);
        let (ladder_index, money, ending) = match last_miss {
            Some(record) if record.response == Response::Exit => (
                climbed,
                config.value_at(climbed),
                Some(Outcome::ExplicitExit),
            ),
            Some(_) => (
                config.milestone_at_or_below(climbed).unwrap_or(0),
                config.fallback_money(climbed),
                Some(Outcome::Busted),
            ),
            None if climbed == config.final_index() => {
                (climbed, config.value_at(climbed), Some(Outcome::Completed))
            }
            None => (climbed, config.value_at(climbed), None),
        };

        if let Some(record) = last_miss {
            if record.amount_won != money {
                return Err(corrupt(format!(
                    "question {} records ${} but ${} was kept",
                    record.question_num, record.amount_won, money
                )));
            }
        }
        if let Some(stored) = snapshot.ladder_index {
            if stored != ladder_index {
                return Err(corrupt(format!(
                    "ladder index {} does not match the history (expected {})",
                    stored, ladder_index
                )));
            }
        }
        if snapshot.final_money != money {
            return Err(corrupt(format!(
                "final money ${} does not match the history (expected ${})",
                snapshot.final_money, money
            )));
        }

        let outcome = match (ending, snapshot.outcome) {
            (Some(forced), None) => {
                if !snapshot.game_over {
                    return Err(corrupt(format!(
                        "history ends in {:?} but the game is not marked over",
                        forced
                    )));
                }
                Some(forced)
            }
            (Some(forced), Some(stored)) if forced == stored => Some(forced),
            (Some(forced), Some(stored)) => {
                return Err(corrupt(format!(
                    "outcome {:?} contradicts a history ending in {:?}",
                    stored, forced
                )));
            }
            (None, None) => snapshot.game_over.then_some(Outcome::WalkedAway),
            (None, Some(stored)) => match stored {
                Outcome::WalkedAway | Outcome::ExplicitExit | Outcome::Aborted
                    if snapshot.game_over =>
                {
                    Some(stored)
                }
                _ => {
                    return Err(corrupt(format!(
                        "outcome {:?} does not fit the history",
                        stored
                    )));
                }
            },
        };

        if outcome.is_some() != snapshot.game_over {
            return Err(corrupt("game_over flag disagrees with the history"));
        }

        // History first so the ledger keeps ask order; anything only in the
        // saved sets was asked after the last record.
        let mut ledger = DedupLedger::default();
        for record in &snapshot.history {
            ledger.register_topic(&record.question.topic);
            ledger.register_question(&record.question.prompt);
        }
        for topic in &snapshot.used_topics {
            ledger.register_topic(topic);
        }
        for text in &snapshot.used_questions {
            ledger.register_question(text);
        }

        let phase = match outcome {
            Some(outcome) => Phase::Finished(outcome),
            None => Phase::AwaitingQuestion,
        };
        info!(
            player = %snapshot.player_name,
            questions = snapshot.history.len(),
            phase = phase.name(),
            "Resumed session"
        );

        Ok(Self {
            config,
            player_name: snapshot.player_name,
            created_at: snapshot.created_at,
            model_id: snapshot.model_id,
            ladder_index,
            current_money: money,
            history: snapshot.history,
            ledger,
            phase,
        })
    }
}
