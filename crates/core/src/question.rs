//! Question and answer value types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One of the four option labels. Labels are positional: `A` is always the
/// first option, `D` the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionLabel {
    A,
    B,
    C,
    D,
}

impl OptionLabel {
    pub const ALL: [OptionLabel; 4] = [OptionLabel::A, OptionLabel::B, OptionLabel::C, OptionLabel::D];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(OptionLabel::A),
            'B' => Some(OptionLabel::B),
            'C' => Some(OptionLabel::C),
            'D' => Some(OptionLabel::D),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        (b'A' + self as u8) as char
    }
}

impl fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not one of A, B, C or D")]
pub struct ParseLabelError(pub String);

impl FromStr for OptionLabel {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c).ok_or_else(|| ParseLabelError(s.to_string())),
            _ => Err(ParseLabelError(s.to_string())),
        }
    }
}

impl Serialize for OptionLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OptionLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A structured multiple-choice question.
///
/// Holding the options in a fixed-size array keeps the label set exactly
/// `{A, B, C, D}`, and `correct` is always one of them by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub options: [String; 4],
    pub correct: OptionLabel,
    pub explanation: String,
    pub topic: String,
}

impl Question {
    pub fn option(&self, label: OptionLabel) -> &str {
        &self.options[label.index()]
    }

    pub fn labeled_options(&self) -> impl Iterator<Item = (OptionLabel, &str)> {
        OptionLabel::ALL
            .into_iter()
            .zip(self.options.iter().map(String::as_str))
    }

    /// Options rendered as `"A. text"`, the form used in saved sessions.
    pub fn formatted_options(&self) -> Vec<String> {
        self.labeled_options()
            .map(|(label, text)| format!("{}. {}", label, text))
            .collect()
    }
}

/// What the player submitted for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Option(OptionLabel),
    Exit,
}

impl Response {
    pub const EXIT: &'static str = "EXIT";

    pub fn label(self) -> Option<OptionLabel> {
        match self {
            Response::Option(label) => Some(label),
            Response::Exit => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Option(label) => write!(f, "{}", label),
            Response::Exit => f.write_str(Self::EXIT),
        }
    }
}

impl FromStr for Response {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case(Self::EXIT) {
            return Ok(Response::Exit);
        }
        s.parse().map(Response::Option)
    }
}
