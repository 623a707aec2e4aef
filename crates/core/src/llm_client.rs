//! Question Source Adapter
//!
//! Sends a topic-scoped prompt to a text-generation backend and hands back
//! whatever text comes out. Nothing here trusts the shape of that text; the
//! normalizer does all parsing.

use crate::config::GameConfig;
use crate::ledger::normalize_question_text;
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// The built-in question prompt. `{topic}`, `{difficulty}` and `{avoid}` are
/// substituted per request.
pub const DEFAULT_PROMPT: &str = include_str!("../prompts/generate_question.md");

/// How many already-asked questions are quoted back to the model.
const MAX_AVOID: usize = 10;

/// Difficulty hint derived from how far up the ladder the player is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Easy before the first milestone, medium before the second, hard after.
    pub fn for_rung(config: &GameConfig, index: usize) -> Self {
        match config.milestones_reached(index) {
            0 => Difficulty::Easy,
            1 => Difficulty::Medium,
            _ => Difficulty::Hard,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy, something most intermediate learners answer correctly",
            Difficulty::Medium => "medium, requiring solid knowledge of everyday English",
            Difficulty::Hard => "hard, the kind of detail only advanced speakers know",
        }
    }
}

/// Everything a source needs to write one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub topic: String,
    /// Question texts already asked this session, oldest first.
    pub used_questions: Vec<String>,
    pub rung: usize,
    pub difficulty: Difficulty,
}

/// Fills a prompt template for one request.
pub fn render_prompt(template: &str, request: &GenerationRequest) -> String {
    let start = request.used_questions.len().saturating_sub(MAX_AVOID);
    let avoid = if request.used_questions.is_empty() {
        "(none yet)".to_string()
    } else {
        request.used_questions[start..]
            .iter()
            .map(|q| format!("- {}", q))
            .collect::<Vec<_>>()
            .join("\n")
    };
    template
        .replace("{topic}", &request.topic)
        .replace("{difficulty}", request.difficulty.describe())
        .replace("{avoid}", &avoid)
}

/// Anything that can turn a generation request into raw question text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Produces unstructured text expected to hold a question, four options,
    /// a correct-answer indicator and an explanation.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// A `QuestionSource` backed by a locally running model server (Ollama)
/// through its OpenAI-compatible chat endpoint.
pub struct OllamaQuestionSource {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    host: String,
    model: String,
    prompt_template: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaQuestionSource {
    /// Creates a source for the server at `host` (e.g. `http://localhost:11434`).
    ///
    /// # Arguments
    ///
    /// * `host` - Base URL of the model server.
    /// * `model` - Model identifier to generate with (e.g. `"llama3.2"`).
    pub fn new(host: &str, model: &str) -> Self {
        let host = host.trim_end_matches('/').to_string();
        let config = OpenAIConfig::new()
            .with_api_key("ollama")
            .with_api_base(format!("{}/v1", host));
        Self {
            client: Client::with_config(config),
            http: reqwest::Client::new(),
            host,
            model: model.to_string(),
            prompt_template: DEFAULT_PROMPT.to_string(),
        }
    }

    /// Replaces the built-in prompt template.
    pub fn with_prompt_template(mut self, template: String) -> Self {
        self.prompt_template = template;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Lists the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.host);
        let tags: TagsResponse = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("Model server unreachable at {}", self.host))?
            .error_for_status()?
            .json()
            .await
            .context("Unexpected model listing from server")?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether the configured model is available, matching `llama3.2` against
    /// tagged names like `llama3.2:latest`.
    pub async fn has_model(&self) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|name| name == &self.model || name.split(':').next() == Some(self.model.as_str())))
    }
}

#[async_trait]
impl QuestionSource for OllamaQuestionSource {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let prompt = render_prompt(&self.prompt_template, request);

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content("You are a quiz master who writes multiple-choice questions.")
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(chat_request).await?;

        let content = response
            .choices
            .first()
            .context("No response choice from model")?
            .message
            .content
            .as_ref()
            .context("No content in model response")?;

        debug!(model = %self.model, raw = %content, "Raw response from model");
        Ok(content.clone())
    }
}

struct BankEntry {
    question: &'static str,
    options: [&'static str; 4],
    correct: char,
    explanation: &'static str,
}

static BANK: [BankEntry; 18] = [
    BankEntry {
        question: "Which of the following is a correct sentence?",
        options: [
            "I have been to Paris last year.",
            "I went to Paris last year.",
            "I have went to Paris last year.",
            "I had been going to Paris last year.",
        ],
        correct: 'B',
        explanation: "With a specific past time (last year) the simple past is used: 'I went to Paris last year'.",
    },
    BankEntry {
        question: "Which word is a synonym for 'happy'?",
        options: ["Sad", "Angry", "Joyful", "Tired"],
        correct: 'C',
        explanation: "'Joyful' means full of joy or happiness, making it a synonym for 'happy'.",
    },
    BankEntry {
        question: "What is the correct spelling?",
        options: ["Accomodate", "Acommodate", "Accommodate", "Acomodate"],
        correct: 'C',
        explanation: "'Accommodate' is spelled with two 'c's and two 'm's.",
    },
    BankEntry {
        question: "Which of these is a correct use of the semicolon?",
        options: [
            "I went to the store; and bought milk.",
            "I went to the store; I bought milk.",
            "I went to the store, I bought milk.",
            "I went to the store; because I needed milk.",
        ],
        correct: 'B',
        explanation: "A semicolon joins two independent clauses without a conjunction.",
    },
    BankEntry {
        question: "Which sentence contains a dangling modifier?",
        options: [
            "The teacher explained the problem to the students.",
            "Walking down the street, the birds sang loudly.",
            "She read the book that I recommended.",
            "After finishing the assignment, the student went home.",
        ],
        correct: 'B',
        explanation: "Birds cannot walk down the street, so 'walking down the street' has no proper subject.",
    },
    BankEntry {
        question: "Which of these is the correct plural form of 'child'?",
        options: ["Childs", "Childes", "Children", "Childrens"],
        correct: 'C',
        explanation: "'Children' is the irregular plural of 'child'.",
    },
    BankEntry {
        question: "What is the meaning of the idiom 'to hit the hay'?",
        options: [
            "To beat someone",
            "To go to sleep",
            "To work on a farm",
            "To exercise vigorously",
        ],
        correct: 'B',
        explanation: "'To hit the hay' means to go to bed, from the days when mattresses were filled with hay.",
    },
    BankEntry {
        question: "Which sentence uses the correct form of the verb?",
        options: [
            "Each of the students have completed the assignment.",
            "Neither of my brothers are going to the party.",
            "The team of doctors has arrived at the hospital.",
            "The staff were divided on the issue.",
        ],
        correct: 'C',
        explanation: "The collective noun 'team' acts as a single unit here and takes the singular 'has'.",
    },
    BankEntry {
        question: "Which sentence uses 'their' correctly?",
        options: [
            "Their going to the park.",
            "The kids forgot their lunches.",
            "Put the box over their.",
            "Their is a problem.",
        ],
        correct: 'B',
        explanation: "'Their' is a possessive determiner, as in 'their lunches'.",
    },
    BankEntry {
        question: "What does the phrasal verb 'give up' mean?",
        options: ["To donate", "To quit", "To lift", "To return"],
        correct: 'B',
        explanation: "To 'give up' something is to stop doing it or stop trying.",
    },
    BankEntry {
        question: "Which word is an antonym of 'generous'?",
        options: ["Kind", "Giving", "Selfish", "Charitable"],
        correct: 'C',
        explanation: "'Selfish' describes the opposite of being willing to give.",
    },
    BankEntry {
        question: "Which prefix turns 'possible' into its opposite?",
        options: ["un-", "im-", "dis-", "non-"],
        correct: 'B',
        explanation: "Before 'p', the negative prefix 'in-' becomes 'im-': 'impossible'.",
    },
    BankEntry {
        question: "Which sentence uses the article correctly?",
        options: [
            "She is an university student.",
            "He bought a umbrella.",
            "I saw an elephant at the zoo.",
            "They live in a old house.",
        ],
        correct: 'C',
        explanation: "'An' goes before a vowel sound, and 'elephant' starts with one.",
    },
    BankEntry {
        question: "Which word is pronounced with a silent 'k'?",
        options: ["Kitten", "Knight", "Kettle", "Kiosk"],
        correct: 'B',
        explanation: "In 'knight' the initial 'k' is silent, so it sounds like 'night'.",
    },
    BankEntry {
        question: "What does the expression 'break the ice' mean?",
        options: [
            "To start a conversation in an awkward situation",
            "To damage something frozen",
            "To end a friendship",
            "To cool down a drink",
        ],
        correct: 'A',
        explanation: "To 'break the ice' is to ease tension when people first meet.",
    },
    BankEntry {
        question: "Which sentence uses the preposition correctly?",
        options: [
            "She is good in math.",
            "He arrived at the airport.",
            "They are interested about art.",
            "We met in Monday.",
        ],
        correct: 'B',
        explanation: "We arrive 'at' a specific place such as an airport.",
    },
    BankEntry {
        question: "In modern slang, what does it mean to 'ghost' someone?",
        options: [
            "To scare them",
            "To suddenly stop all communication with them",
            "To imitate them",
            "To forget their name",
        ],
        correct: 'B',
        explanation: "'Ghosting' is ending contact abruptly without any explanation.",
    },
    BankEntry {
        question: "Which word is spelled correctly?",
        options: ["Definately", "Seperate", "Recieve", "Necessary"],
        correct: 'D',
        explanation: "'Necessary' has one 'c' and two 's's.",
    },
];

/// An offline `QuestionSource` serving a fixed bank of questions.
///
/// Useful when no model server is running, and for predictable tests. It
/// returns the first bank entry not yet asked, rendered as labeled plain
/// text so it still goes through the normalizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticQuestionSource;

impl StaticQuestionSource {
    pub fn bank_size() -> usize {
        BANK.len()
    }

    fn render(entry: &BankEntry) -> String {
        format!(
            "Question: {}\nA. {}\nB. {}\nC. {}\nD. {}\nCorrect answer: {}\nExplanation: {}",
            entry.question,
            entry.options[0],
            entry.options[1],
            entry.options[2],
            entry.options[3],
            entry.correct,
            entry.explanation
        )
    }
}

#[async_trait]
impl QuestionSource for StaticQuestionSource {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let used: Vec<String> = request
            .used_questions
            .iter()
            .map(|q| normalize_question_text(q))
            .collect();
        let entry = BANK
            .iter()
            .find(|entry| !used.contains(&normalize_question_text(entry.question)))
            .unwrap_or(&BANK[request.used_questions.len() % BANK.len()]);
        Ok(Self::render(entry))
    }
}
