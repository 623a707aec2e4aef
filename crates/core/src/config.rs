//! Static Game Configuration
//!
//! The money ladder, the milestone rungs and the topic pool. A `GameConfig` is
//! built once at startup, validated, and handed to every session behind an
//! `Arc`. Nothing mutates it afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors raised when a ladder, milestone set or topic pool is unusable.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GameConfigError {
    #[error("money ladder needs at least 2 rungs, got {0}")]
    LadderTooShort(usize),
    #[error("money ladder must be strictly increasing (rung {index} is {value})")]
    LadderNotIncreasing { index: usize, value: u64 },
    #[error("milestone rung {0} is outside the ladder")]
    MilestoneOutOfRange(usize),
    #[error("topic pool is empty")]
    NoTopics,
    #[error("could not read game config file: {0}")]
    Read(String),
}

/// The immutable rules of a game.
///
/// `ladder[0]` is the amount a player holds before answering anything; every
/// correct answer moves one rung up. `milestones` holds rung *indices*, never
/// amounts, and is kept sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    ladder: Vec<u64>,
    milestones: Vec<usize>,
    topics: Vec<String>,
}

impl GameConfig {
    /// Builds and validates a configuration.
    pub fn new(
        ladder: Vec<u64>,
        mut milestones: Vec<usize>,
        topics: Vec<String>,
    ) -> Result<Self, GameConfigError> {
        if ladder.len() < 2 {
            return Err(GameConfigError::LadderTooShort(ladder.len()));
        }
        if let Some(index) = (1..ladder.len()).find(|&i| ladder[i] <= ladder[i - 1]) {
            return Err(GameConfigError::LadderNotIncreasing {
                index,
                value: ladder[index],
            });
        }
        if let Some(&bad) = milestones.iter().find(|&&m| m == 0 || m >= ladder.len()) {
            return Err(GameConfigError::MilestoneOutOfRange(bad));
        }
        if topics.is_empty() {
            return Err(GameConfigError::NoTopics);
        }
        milestones.sort_unstable();
        milestones.dedup();
        Ok(Self {
            ladder,
            milestones,
            topics,
        })
    }

    /// Loads a configuration from a JSON file shaped like
    /// `{"ladder": [...], "milestones": [...], "topics": [...]}`.
    pub fn from_json_file(path: &Path) -> Result<Self, GameConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GameConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let parsed: GameConfig = serde_json::from_str(&raw)
            .map_err(|e| GameConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::new(parsed.ladder, parsed.milestones, parsed.topics)
    }

    pub fn ladder(&self) -> &[u64] {
        &self.ladder
    }

    pub fn milestones(&self) -> &[usize] {
        &self.milestones
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Index of the top rung. Reaching it ends the game as a win.
    pub fn final_index(&self) -> usize {
        self.ladder.len() - 1
    }

    /// Money held at `index`, clamped to the top rung.
    pub fn value_at(&self, index: usize) -> u64 {
        self.ladder[index.min(self.final_index())]
    }

    pub fn is_milestone(&self, index: usize) -> bool {
        self.milestones.binary_search(&index).is_ok()
    }

    /// The highest milestone rung at or below `index`, if one has been reached.
    pub fn milestone_at_or_below(&self, index: usize) -> Option<usize> {
        self.milestones.iter().rev().copied().find(|&m| m <= index)
    }

    /// Money a player keeps after missing a question asked from rung `index`.
    pub fn fallback_money(&self, index: usize) -> u64 {
        self.milestone_at_or_below(index)
            .map(|m| self.ladder[m])
            .unwrap_or(0)
    }

    /// Number of milestones already reached from rung `index`.
    pub fn milestones_reached(&self, index: usize) -> usize {
        self.milestones.iter().filter(|&&m| m <= index).count()
    }
}

const DEFAULT_LADDER: [u64; 16] = [
    0, 100, 200, 300, 500, 1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 64_000, 125_000, 250_000,
    500_000, 1_000_000,
];

const DEFAULT_MILESTONES: [usize; 2] = [5, 10];

const DEFAULT_TOPICS: [&str; 15] = [
    "Grammar - Verb Tenses",
    "Grammar - Prepositions",
    "Grammar - Articles",
    "Grammar - Pronouns",
    "Vocabulary - Synonyms",
    "Vocabulary - Antonyms",
    "Vocabulary - Homophones",
    "Idioms - Common Expressions",
    "Idioms - Figurative Language",
    "Slang - Everyday Usage",
    "Pronunciation - Commonly Mispronounced Words",
    "Punctuation - Correct Usage",
    "Spelling - Commonly Misspelled Words",
    "Phrasal Verbs - Common Combinations",
    "Word Formation - Prefixes and Suffixes",
];

impl Default for GameConfig {
    /// Fifteen questions from $100 to $1,000,000 with safety nets at $1,000
    /// and $32,000, over a pool of English-language topics.
    fn default() -> Self {
        Self {
            ladder: DEFAULT_LADDER.to_vec(),
            milestones: DEFAULT_MILESTONES.to_vec(),
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
        }
    }
}
