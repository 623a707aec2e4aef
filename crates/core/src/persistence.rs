//! Session Persistence
//!
//! Sessions are stored as pretty-printed JSON, one file per session. Writes
//! go to a temporary sibling first and are renamed into place, so a crash
//! leaves either the previous snapshot or the new one on disk.

use crate::config::GameConfig;
use crate::question::{OptionLabel, Question, Response};
use crate::session::{AnswerRecord, CorruptSessionError, Outcome, Session, SessionSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("session file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("session file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: CorruptSessionError,
    },
    #[error("could not read session file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write session file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One entry of `questions_asked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEntry {
    pub question_num: u32,
    pub question: String,
    /// Each option prefixed with its label, e.g. `"A. Went"`.
    pub options: Vec<String>,
    /// An option label or `EXIT`.
    pub user_answer: String,
    pub correct_answer: String,
    pub explanation: String,
    pub topic: String,
    pub amount_won: u64,
}

/// The on-disk shape of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub player_name: String,
    pub timestamp: String,
    pub model_used: String,
    pub final_money: u64,
    pub questions_asked: Vec<QuestionEntry>,
    pub game_over: bool,
    pub used_topics: BTreeSet<String>,
    pub used_questions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ladder_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl QuestionEntry {
    fn from_record(record: &AnswerRecord) -> Self {
        Self {
            question_num: record.question_num,
            question: record.question.prompt.clone(),
            options: record.question.formatted_options(),
            user_answer: record.response.to_string(),
            correct_answer: record.question.correct.to_string(),
            explanation: record.question.explanation.clone(),
            topic: record.question.topic.clone(),
            amount_won: record.amount_won,
        }
    }

    fn into_record(self) -> Result<AnswerRecord, CorruptSessionError> {
        let num = self.question_num;
        if self.options.len() != OptionLabel::ALL.len() {
            return Err(CorruptSessionError(format!(
                "question {} has {} options instead of 4",
                num,
                self.options.len()
            )));
        }
        let options: [String; 4] = self
            .options
            .into_iter()
            .zip(OptionLabel::ALL)
            .map(|(text, label)| strip_label(text, label))
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| CorruptSessionError(format!("question {} options are unreadable", num)))?;
        let response: Response = self.user_answer.parse().map_err(|e| {
            CorruptSessionError(format!("question {} has an invalid answer: {}", num, e))
        })?;
        let correct: OptionLabel = self.correct_answer.parse().map_err(|e| {
            CorruptSessionError(format!(
                "question {} has an invalid correct answer: {}",
                num, e
            ))
        })?;

        Ok(AnswerRecord {
            question_num: num,
            question: Question {
                prompt: self.question,
                options,
                correct,
                explanation: self.explanation,
                topic: self.topic,
            },
            response,
            correct: response == Response::Option(correct),
            amount_won: self.amount_won,
        })
    }
}

/// `"A. Went"` becomes `"Went"`; text without its label is kept as is.
fn strip_label(text: String, label: OptionLabel) -> String {
    let prefix = format!("{}.", label);
    match text.strip_prefix(&prefix) {
        Some(rest) => rest.trim_start().to_string(),
        None => text,
    }
}

impl SessionDocument {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self {
            player_name: snapshot.player_name.clone(),
            timestamp: snapshot.created_at.clone(),
            model_used: snapshot.model_id.clone(),
            final_money: snapshot.final_money,
            questions_asked: snapshot
                .history
                .iter()
                .map(QuestionEntry::from_record)
                .collect(),
            game_over: snapshot.game_over,
            used_topics: snapshot.used_topics.clone(),
            used_questions: snapshot.used_questions.clone(),
            ladder_index: snapshot.ladder_index,
            outcome: snapshot.outcome,
        }
    }

    pub fn into_snapshot(self) -> Result<SessionSnapshot, CorruptSessionError> {
        let history = self
            .questions_asked
            .into_iter()
            .map(QuestionEntry::into_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SessionSnapshot {
            player_name: self.player_name,
            created_at: self.timestamp,
            model_id: self.model_used,
            ladder_index: self.ladder_index,
            final_money: self.final_money,
            history,
            game_over: self.game_over,
            outcome: self.outcome,
            used_topics: self.used_topics,
            used_questions: self.used_questions,
        })
    }
}

/// Writes `bytes` to `path` through a synced temporary file in the same
/// directory followed by a rename.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp_path = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));

    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Serializes the session and replaces `path` atomically.
pub fn save(session: &Session, path: &Path) -> Result<(), PersistenceError> {
    let document = SessionDocument::from_snapshot(&session.snapshot());
    let json = serde_json::to_string_pretty(&document)?;
    write_atomically(path, json.as_bytes()).map_err(|source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), questions = document.questions_asked.len(), "Saved session");
    Ok(())
}

/// Reads and parses a session document without validating its history.
pub fn read_document(path: &Path) -> Result<SessionDocument, PersistenceError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PersistenceError::NotFound(path.to_path_buf()));
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            return Err(PersistenceError::Corrupt {
                path: path.to_path_buf(),
                source: CorruptSessionError(format!("not UTF-8 text: {}", e)),
            });
        }
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&raw).map_err(|e| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        source: CorruptSessionError(e.to_string()),
    })
}

/// Loads and validates a session. The file is never modified, even when it
/// turns out to be corrupt.
pub fn load(path: &Path, config: Arc<GameConfig>) -> Result<Session, PersistenceError> {
    let corrupt = |source| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        source,
    };
    let snapshot = read_document(path)?.into_snapshot().map_err(corrupt)?;
    let session = Session::resume(snapshot, config).map_err(corrupt)?;
    info!(path = %path.display(), "Loaded session");
    Ok(session)
}

/// Replaces anything but letters, digits, `-` and `_` with `_`.
pub fn sanitize_player_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "Player".to_string()
    } else {
        cleaned
    }
}

/// A directory of saved sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<sanitized player>-<timestamp>.json` inside the store.
    pub fn path_for(&self, session: &Session) -> PathBuf {
        self.dir.join(format!(
            "{}-{}.json",
            sanitize_player_name(session.player_name()),
            session.created_at()
        ))
    }

    /// Like `path_for`, but skips names already on disk by appending `-2`,
    /// `-3` and so on. Two games started by the same player within one
    /// second would otherwise share a file.
    pub fn fresh_path_for(&self, session: &Session) -> PathBuf {
        let base = self.path_for(session);
        if !base.exists() {
            return base;
        }
        let stem = format!(
            "{}-{}",
            sanitize_player_name(session.player_name()),
            session.created_at()
        );
        (2u32..)
            .map(|n| self.dir.join(format!("{}-{}.json", stem, n)))
            .find(|path| !path.exists())
            .unwrap_or(base)
    }

    pub fn save(&self, session: &Session) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(session);
        save(session, &path)?;
        Ok(path)
    }

    pub fn load(&self, path: &Path, config: Arc<GameConfig>) -> Result<Session, PersistenceError> {
        load(path, config)
    }

    /// Saved session files, sorted by name. A missing directory holds none.
    pub fn list(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.is_file() && name.ends_with(".json") && name.contains('-') && !name.starts_with('.')
            {
                sessions.push(path);
            }
        }
        sessions.sort();
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;
    use tempfile::tempdir;

    fn config() -> Arc<GameConfig> {
        Arc::new(GameConfig::default())
    }

    fn question(n: usize) -> Question {
        Question {
            prompt: format!("Which word fits blank number {}?", n),
            options: ["their".into(), "there".into(), "they're".into(), "thier".into()],
            correct: OptionLabel::B,
            explanation: "Place, not possession.".into(),
            topic: "Vocabulary - Homophones".into(),
        }
    }

    fn played_session(correct_answers: usize) -> Session {
        let mut session =
            Session::start_at("Ada Lovelace", "llama3.2", config(), "20250101-090000".into());
        for n in 0..correct_answers {
            if n > 0 {
                session.continue_playing().unwrap();
            }
            session.issue_question(question(n)).unwrap();
            session.submit_answer(OptionLabel::B).unwrap();
        }
        session
    }

    #[test]
    fn save_writes_the_documented_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.json");
        save(&played_session(1), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["player_name"], "Ada Lovelace");
        assert_eq!(value["timestamp"], "20250101-090000");
        assert_eq!(value["model_used"], "llama3.2");
        assert_eq!(value["final_money"], 100);
        assert_eq!(value["game_over"], false);
        let entry = &value["questions_asked"][0];
        assert_eq!(entry["question_num"], 1);
        assert_eq!(entry["options"][1], "B. there");
        assert_eq!(entry["user_answer"], "B");
        assert_eq!(entry["correct_answer"], "B");
        assert_eq!(entry["amount_won"], 100);
        assert_eq!(value["used_topics"][0], "Vocabulary - Homophones");
    }

    #[test]
    fn save_leaves_no_temporary_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.json");
        save(&played_session(1), &path).unwrap();
        save(&played_session(2), &path).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("game.json")]);
    }

    #[test]
    fn load_round_trips_a_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.json");
        let session = played_session(3);
        save(&session, &path).unwrap();

        let loaded = load(&path, config()).unwrap();
        assert_eq!(loaded.snapshot(), session.snapshot());
        assert_eq!(loaded.phase(), &Phase::AwaitingQuestion);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = load(&dir.path().join("nope.json"), config()).unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }

    #[test]
    fn invalid_json_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load(&path, config()),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn invalid_answer_label_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.json");
        save(&played_session(1), &path).unwrap();
        let raw = fs::read_to_string(&path)
            .unwrap()
            .replace("\"user_answer\": \"B\"", "\"user_answer\": \"Q\"");
        fs::write(&path, &raw).unwrap();

        assert!(matches!(
            load(&path, config()),
            Err(PersistenceError::Corrupt { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), raw);
    }

    #[test]
    fn legacy_documents_without_index_or_outcome_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        fs::write(
            &path,
            r#"{
                "player_name": "Sam",
                "timestamp": "20240101-120000",
                "model_used": "llama3.2",
                "final_money": 0,
                "questions_asked": [{
                    "question_num": 1,
                    "question": "What is the past tense of 'go'?",
                    "options": ["A. Goed", "B. Went", "C. Gone", "D. Going"],
                    "user_answer": "A",
                    "correct_answer": "B",
                    "explanation": "Irregular verb.",
                    "topic": "Grammar - Verb Tenses",
                    "amount_won": 0
                }],
                "game_over": true,
                "used_topics": ["Grammar - Verb Tenses"],
                "used_questions": ["What is the past tense of 'go'?"]
            }"#,
        )
        .unwrap();

        let session = load(&path, config()).unwrap();
        assert_eq!(session.outcome(), Some(Outcome::Busted));
        assert_eq!(session.history()[0].question.option(OptionLabel::B), "Went");
    }

    #[test]
    fn player_names_are_sanitized() {
        assert_eq!(sanitize_player_name("Ada Lovelace"), "Ada_Lovelace");
        assert_eq!(sanitize_player_name("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_player_name("   "), "Player");
    }

    #[test]
    fn store_names_and_lists_sessions() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let path = store.save(&played_session(1)).unwrap();
        assert_eq!(
            path.file_name().unwrap(),
            "Ada_Lovelace-20250101-090000.json"
        );

        fs::write(dir.path().join("notes.json"), "{}").unwrap();
        fs::write(dir.path().join("Bob-20240101-000000.json"), "{}").unwrap();
        fs::write(dir.path().join("readme.txt"), "hi").unwrap();

        let listed: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            listed,
            vec!["Ada_Lovelace-20250101-090000.json", "Bob-20240101-000000.json"]
        );
    }

    #[test]
    fn fresh_paths_never_reuse_an_existing_file() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let first = played_session(1);
        let saved = store.save(&first).unwrap();
        assert_eq!(
            store.fresh_path_for(&first),
            dir.path().join("Ada_Lovelace-20250101-090000-2.json")
        );

        fs::write(dir.path().join("Ada_Lovelace-20250101-090000-2.json"), "{}").unwrap();
        assert_eq!(
            store.fresh_path_for(&first),
            dir.path().join("Ada_Lovelace-20250101-090000-3.json")
        );
        assert_eq!(store.path_for(&first), saved);
    }

    #[test]
    fn listing_a_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }
}
