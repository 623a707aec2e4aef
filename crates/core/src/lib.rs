//! Millionaire Core Library
//!
//! Game rules and plumbing for a terminal quiz in the style of "Who Wants to
//! Be a Millionaire". Questions come from a local language model through a
//! [`llm_client::QuestionSource`], are normalized into structured form, and
//! are played through a [`session::Session`] state machine whose snapshots
//! are written atomically to disk after every answer.

pub mod config;
pub mod game;
pub mod generator;
pub mod ledger;
pub mod llm_client;
pub mod normalizer;
pub mod persistence;
pub mod question;
pub mod session;

pub use config::GameConfig;
pub use game::{Game, GameError, SnapshotStatus};
pub use generator::{GenerationError, GenerationPolicy, QuestionGenerator};
pub use question::{OptionLabel, Question, Response};
pub use session::{Outcome, Phase, Session, SessionError};
