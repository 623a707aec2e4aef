//! Game Orchestration
//!
//! Ties a [`Session`] to a question generator and a session file. Every
//! state change that matters to a saved game is followed by a snapshot, and
//! a failed snapshot never interrupts play: it is logged and the game keeps
//! running with autosave marked degraded.

use crate::generator::{GenerationError, QuestionGenerator};
use crate::persistence::{self, SessionStore};
use crate::question::{OptionLabel, Question};
use crate::session::{AnswerRecord, Phase, Session, SessionError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("could not produce a question: {0}")]
    Generation(#[from] GenerationError),
}

/// Result of the most recent snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    NotYetSaved,
    Saved,
    Failed(String),
}

pub struct Game {
    session: Session,
    generator: QuestionGenerator,
    path: PathBuf,
    rng: StdRng,
    snapshot: SnapshotStatus,
    autosave_degraded: bool,
}

impl Game {
    /// A new game saved under the store's naming scheme, never on top of an
    /// earlier session's file.
    pub fn new(session: Session, generator: QuestionGenerator, store: &SessionStore) -> Self {
        let path = store.fresh_path_for(&session);
        Self::resumed(session, generator, path)
    }

    /// A game that keeps writing to the file it was loaded from.
    pub fn resumed(session: Session, generator: QuestionGenerator, path: PathBuf) -> Self {
        Self {
            session,
            generator,
            path,
            rng: StdRng::from_os_rng(),
            snapshot: SnapshotStatus::NotYetSaved,
            autosave_degraded: false,
        }
    }

    /// Replaces the topic RNG, for reproducible runs.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot_status(&self) -> &SnapshotStatus {
        &self.snapshot
    }

    /// True once any snapshot has failed during this game.
    pub fn autosave_degraded(&self) -> bool {
        self.autosave_degraded
    }

    /// Generates and issues the next question.
    ///
    /// When generation fails for good the session is aborted and saved, and
    /// the error is returned so the caller can end the game.
    pub async fn next_question(&mut self) -> Result<&Question, GameError> {
        if self.session.phase() != &Phase::AwaitingQuestion {
            return Err(self.session.invalid_transition("request a question").into());
        }

        let generated = self
            .generator
            .generate(
                self.session.config(),
                self.session.ledger(),
                self.session.ladder_index(),
                &mut self.rng,
            )
            .await;

        match generated {
            Ok(question) => Ok(self.session.issue_question(question)?),
            Err(e) => {
                error!(error = %e, "Cannot continue without a question");
                self.session.abort(&e.to_string());
                self.snapshot();
                Err(e.into())
            }
        }
    }

    pub fn answer(&mut self, label: OptionLabel) -> Result<AnswerRecord, SessionError> {
        let record = self.session.submit_answer(label)?.clone();
        self.snapshot();
        Ok(record)
    }

    /// Exits and saves. Returns the money kept.
    pub fn exit(&mut self) -> u64 {
        let money = self.session.request_exit();
        self.snapshot();
        money
    }

    pub fn cash_out(&mut self) -> Result<u64, SessionError> {
        let money = self.session.cash_out()?;
        self.snapshot();
        Ok(money)
    }

    pub fn keep_playing(&mut self) -> Result<(), SessionError> {
        self.session.continue_playing()
    }

    /// Writes the session to its file, recording the outcome.
    pub fn snapshot(&mut self) -> &SnapshotStatus {
        match persistence::save(&self.session, &self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Session snapshot written");
                self.snapshot = SnapshotStatus::Saved;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Session snapshot failed");
                self.snapshot = SnapshotStatus::Failed(e.to_string());
                self.autosave_degraded = true;
            }
        }
        &self.snapshot
    }
}
