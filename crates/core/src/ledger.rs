//! Deduplication Ledger
//!
//! Tracks which topics and question texts a session has already used. The
//! sets belong to the session; the ledger only reads and extends them.

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Canonical form used to compare question texts: trimmed, lowercased, with
/// internal whitespace collapsed to single spaces.
pub fn normalize_question_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Uniform choice among topics not yet used, or among the whole pool once
/// every topic has been used. Returns `None` only for an empty pool.
pub fn pick_topic<'a, R: Rng + ?Sized>(
    used_topics: &BTreeSet<String>,
    topic_pool: &'a [String],
    rng: &mut R,
) -> Option<&'a str> {
    let fresh: Vec<&String> = topic_pool
        .iter()
        .filter(|t| !used_topics.contains(*t))
        .collect();
    if fresh.is_empty() {
        topic_pool.choose(rng).map(String::as_str)
    } else {
        fresh.choose(rng).copied().map(String::as_str)
    }
}

/// Exact match after trimming and case/whitespace normalization.
pub fn is_duplicate_question(text: &str, used_questions: &BTreeSet<String>) -> bool {
    let key = normalize_question_text(text);
    used_questions
        .iter()
        .any(|used| normalize_question_text(used) == key)
}

/// The used-topic and used-question sets of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupLedger {
    used_topics: BTreeSet<String>,
    used_questions: BTreeSet<String>,
    /// The same question texts in the order they were registered.
    #[serde(default)]
    asked: Vec<String>,
}

impl DedupLedger {
    /// Seeds a ledger from bare sets. Their registration order is unknown,
    /// so `asked_in_order` starts out sorted.
    pub fn new(used_topics: BTreeSet<String>, used_questions: BTreeSet<String>) -> Self {
        let asked = used_questions.iter().cloned().collect();
        Self {
            used_topics,
            used_questions,
            asked,
        }
    }

    pub fn used_topics(&self) -> &BTreeSet<String> {
        &self.used_topics
    }

    pub fn used_questions(&self) -> &BTreeSet<String> {
        &self.used_questions
    }

    /// Used question texts, oldest first.
    pub fn asked_in_order(&self) -> &[String] {
        &self.asked
    }

    pub fn pick_topic<'a, R: Rng + ?Sized>(
        &self,
        topic_pool: &'a [String],
        rng: &mut R,
    ) -> Option<&'a str> {
        pick_topic(&self.used_topics, topic_pool, rng)
    }

    pub fn register_topic(&mut self, topic: &str) {
        self.used_topics.insert(topic.to_string());
    }

    pub fn is_duplicate_question(&self, text: &str) -> bool {
        is_duplicate_question(text, &self.used_questions)
    }

    /// Records a question text. Returns `false` if it was already present.
    pub fn register_question(&mut self, text: &str) -> bool {
        if self.is_duplicate_question(text) {
            return false;
        }
        let text = text.trim().to_string();
        self.asked.push(text.clone());
        self.used_questions.insert(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pool() -> Vec<String> {
        vec!["Idioms".into(), "Slang".into(), "Spelling".into()]
    }

    #[test]
    fn picks_only_unused_topics() {
        let mut rng = StdRng::seed_from_u64(7);
        let used: BTreeSet<String> = ["Idioms".to_string(), "Slang".to_string()].into();
        let pool = pool();
        for _ in 0..20 {
            assert_eq!(pick_topic(&used, &pool, &mut rng), Some("Spelling"));
        }
    }

    #[test]
    fn reuses_the_pool_once_exhausted() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool = pool();
        let used: BTreeSet<String> = pool.iter().cloned().collect();
        let picked = pick_topic(&used, &pool, &mut rng).unwrap();
        assert!(pool.iter().any(|t| t == picked));
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(pick_topic(&BTreeSet::new(), &[], &mut rng), None);
    }

    #[test]
    fn duplicate_check_ignores_case_and_spacing() {
        let used: BTreeSet<String> = ["What is the past tense of 'go'?".to_string()].into();
        assert!(is_duplicate_question(
            "  what is the PAST tense   of 'go'? ",
            &used
        ));
        assert!(!is_duplicate_question("What is the past tense of 'see'?", &used));
    }

    #[test]
    fn register_question_refuses_repeats() {
        let mut ledger = DedupLedger::default();
        assert!(ledger.register_question("Which word is a synonym for 'happy'?"));
        assert!(!ledger.register_question("which word is a synonym for 'HAPPY'?"));
        assert_eq!(ledger.used_questions().len(), 1);
    }

    #[test]
    fn asked_order_follows_registration() {
        let mut ledger = DedupLedger::default();
        ledger.register_question("Zebra question?");
        ledger.register_question("Apple question?");
        ledger.register_question("zebra   QUESTION?");
        assert_eq!(
            ledger.asked_in_order(),
            ["Zebra question?".to_string(), "Apple question?".to_string()]
        );
    }

    #[test]
    fn register_topic_feeds_pick_topic() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ledger = DedupLedger::default();
        let pool = pool();
        ledger.register_topic("Idioms");
        ledger.register_topic("Spelling");
        assert_eq!(ledger.pick_topic(&pool, &mut rng), Some("Slang"));
    }
}
