//! Interactive Game Runner
//!
//! Drives the main menu, new and loaded games, the question loop and the
//! play-again prompt over any line-based input and writable output. End of
//! input and an interrupt are both treated as the player choosing to exit,
//! which always writes a final snapshot before returning.

use crate::terminal::{
    InvalidInputError, MenuChoice, format_money, parse_answer, parse_menu_choice,
    parse_selection, parse_yes_no, player_name_or_default, render_answer_result,
    render_game_over, render_menu, render_question, render_resume_summary, render_session_list,
    render_status, render_welcome,
};
use colored::Colorize;
use millionaire_core::llm_client::QuestionSource;
use millionaire_core::persistence::SessionStore;
use millionaire_core::{
    Game, GameConfig, GameError, GenerationPolicy, Phase, QuestionGenerator, Response, Session,
    SnapshotStatus,
};
use std::fmt::Display;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{info, warn};

/// Everything a game needs besides the terminal.
#[derive(Clone)]
pub struct GameServices {
    pub config: Arc<GameConfig>,
    pub store: SessionStore,
    pub source: Arc<dyn QuestionSource>,
    pub policy: GenerationPolicy,
    pub model_id: String,
}

impl GameServices {
    fn generator(&self) -> QuestionGenerator {
        QuestionGenerator::new(self.source.clone(), self.policy.clone())
    }
}

/// Resolves once the interrupt flag is raised. Without a flag, or once its
/// sender is gone, it never resolves.
async fn interrupted(flag: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = flag {
        if rx.wait_for(|raised| *raised).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

pub struct Runner<R, W> {
    services: GameServices,
    input: R,
    output: W,
    interrupt: Option<watch::Receiver<bool>>,
}

impl<R, W> Runner<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(services: GameServices, input: R, output: W) -> Self {
        Self {
            services,
            input,
            output,
            interrupt: None,
        }
    }

    /// Treats a raised flag as the player exiting at the next safe point.
    pub fn with_interrupt(mut self, flag: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Runs until the player leaves. With `resume`, that session is loaded
    /// first instead of showing the menu.
    pub async fn run(&mut self, resume: Option<&Path>) -> anyhow::Result<()> {
        self.say(render_welcome())?;

        let mut next = match resume {
            Some(path) => self.load_game(path)?,
            None => None,
        };
        loop {
            let game = match next.take() {
                Some(game) => game,
                None => match self.main_menu().await? {
                    Some(game) => game,
                    None => break,
                },
            };
            self.play(game).await?;

            match self.ask_yes_no("\nWould you like to play again? (Y/N): ").await? {
                Some(true) => continue,
                _ => break,
            }
        }

        self.say("\nThank you for playing! Goodbye!".yellow())?;
        Ok(())
    }

    async fn main_menu(&mut self) -> anyhow::Result<Option<Game>> {
        loop {
            self.say(render_menu())?;
            let Some(line) = self.prompt("\nEnter your choice (1-3): ").await? else {
                return Ok(None);
            };
            match parse_menu_choice(&line) {
                Ok(MenuChoice::NewGame) => {
                    let Some(name) = self.prompt("\nEnter your name: ").await? else {
                        return Ok(None);
                    };
                    return Ok(Some(self.new_game(&player_name_or_default(&name))));
                }
                Ok(MenuChoice::LoadGame) => {
                    if let Some(game) = self.choose_saved_game().await? {
                        return Ok(Some(game));
                    }
                }
                Ok(MenuChoice::Exit) => return Ok(None),
                Err(e) => self.complain(&e)?,
            }
        }
    }

    fn new_game(&self, player_name: &str) -> Game {
        let services = &self.services;
        let session = Session::start_new(player_name, &services.model_id, services.config.clone());
        Game::new(session, services.generator(), &services.store)
    }

    async fn choose_saved_game(&mut self) -> anyhow::Result<Option<Game>> {
        let saved = match self.services.store.list() {
            Ok(saved) => saved,
            Err(e) => {
                warn!(dir = %self.services.store.dir().display(), error = %e, "Could not list saved sessions");
                self.say(format!("Error listing saved sessions: {}", e).red())?;
                return Ok(None);
            }
        };
        self.say(render_session_list(&saved))?;
        if saved.is_empty() {
            return Ok(None);
        }

        loop {
            let Some(line) = self
                .prompt("\nEnter the number of the session to load (or press Enter to go back): ")
                .await?
            else {
                return Ok(None);
            };
            match parse_selection(&line, saved.len()) {
                Ok(Some(index)) => return self.load_game(&saved[index]),
                Ok(None) => return Ok(None),
                Err(e) => self.complain(&e)?,
            }
        }
    }

    /// Loads a session and prints its summary. Finished sessions are shown
    /// but not played.
    fn load_game(&mut self, path: &Path) -> anyhow::Result<Option<Game>> {
        let session = match self.services.store.load(path, self.services.config.clone()) {
            Ok(session) => session,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not load session");
                self.say(format!("\nError loading session: {}", e).red())?;
                return Ok(None);
            }
        };

        self.say(render_resume_summary(&session, path))?;
        if session.is_over() {
            return Ok(None);
        }
        Ok(Some(Game::resumed(
            session,
            self.services.generator(),
            path.to_path_buf(),
        )))
    }

    async fn play(&mut self, mut game: Game) -> anyhow::Result<()> {
        info!(
            player = game.session().player_name(),
            path = %game.path().display(),
            "Game started"
        );

        while !game.session().is_over() {
            self.say(render_status(game.session()))?;

            let generated = {
                let interrupt = &mut self.interrupt;
                tokio::select! {
                    result = game.next_question() => Some(result.map(|q| q.clone())),
                    _ = interrupted(interrupt) => None,
                }
            };
            let question = match generated {
                Some(Ok(question)) => question,
                Some(Err(GameError::Generation(e))) => {
                    self.say(
                        format!("\nCould not generate a question ({}). The game cannot continue.", e)
                            .red(),
                    )?;
                    self.report_snapshot(&game)?;
                    break;
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    self.say("\n\nGame interrupted. Exiting gracefully...".yellow())?;
                    game.exit();
                    self.report_snapshot(&game)?;
                    break;
                }
            };

            let prize = game.session().next_prize().unwrap_or_default();
            self.say(render_question(&question, prize))?;

            match self.ask_answer().await? {
                Some(Response::Option(label)) => {
                    let record = game.answer(label)?;
                    self.say(render_answer_result(&record))?;
                }
                Some(Response::Exit) | None => {
                    game.exit();
                    self.say("\nGame ended by player.".yellow())?;
                }
            }
            self.report_snapshot(&game)?;

            if game.session().phase() == &Phase::AwaitingContinueDecision {
                let prompt = format!(
                    "\nYou have {}. Do you want to continue? (Y/N): ",
                    format_money(game.session().current_money())
                );
                match self.ask_yes_no(&prompt).await? {
                    Some(true) => game.keep_playing()?,
                    Some(false) => {
                        let money = game.cash_out()?;
                        self.say(
                            format!("\nCongratulations! You're taking home {}!", format_money(money))
                                .green(),
                        )?;
                        self.report_snapshot(&game)?;
                    }
                    None => {
                        game.exit();
                        self.report_snapshot(&game)?;
                    }
                }
            }
        }

        info!(
            outcome = ?game.session().outcome(),
            money = game.session().current_money(),
            "Game finished"
        );
        self.say(render_game_over(game.session()))?;
        if game.autosave_degraded() {
            self.say(
                format!(
                    "Some progress may not have been saved to {}. See the log for details.",
                    game.path().display()
                )
                .yellow(),
            )?;
        }
        Ok(())
    }

    fn report_snapshot(&mut self, game: &Game) -> io::Result<()> {
        match game.snapshot_status() {
            SnapshotStatus::Saved => self.say(
                format!("\nGame session saved to {}", game.path().display()).green(),
            ),
            SnapshotStatus::Failed(reason) => self.say(
                format!("\nWarning: could not save the game ({}). Play continues.", reason)
                    .yellow(),
            ),
            SnapshotStatus::NotYetSaved => Ok(()),
        }
    }

    /// `None` when input ended or the player was interrupted.
    async fn ask_answer(&mut self) -> anyhow::Result<Option<Response>> {
        loop {
            let Some(line) = self
                .prompt("Your answer (A/B/C/D) or type EXIT to quit: ")
                .await?
            else {
                return Ok(None);
            };
            match parse_answer(&line) {
                Ok(response) => return Ok(Some(response)),
                Err(e) => self.complain(&e)?,
            }
        }
    }

    async fn ask_yes_no(&mut self, question: &str) -> anyhow::Result<Option<bool>> {
        loop {
            let Some(line) = self.prompt(question).await? else {
                return Ok(None);
            };
            match parse_yes_no(&line) {
                Ok(answer) => return Ok(Some(answer)),
                Err(e) => self.complain(&e)?,
            }
        }
    }

    fn say(&mut self, text: impl Display) -> io::Result<()> {
        writeln!(self.output, "{}", text)
    }

    fn complain(&mut self, error: &InvalidInputError) -> io::Result<()> {
        self.say(error.to_string().red())
    }

    /// Prints `text` without a newline and reads one line. `None` on end of
    /// input or interrupt.
    async fn prompt(&mut self, text: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", text)?;
        self.output.flush()?;

        let mut line = String::new();
        let read = {
            let input = &mut self.input;
            let interrupt = &mut self.interrupt;
            tokio::select! {
                result = input.read_line(&mut line) => Some(result?),
                _ = interrupted(interrupt) => None,
            }
        };
        match read {
            Some(0) | None => {
                writeln!(self.output)?;
                Ok(None)
            }
            Some(_) => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
        }
    }
}
