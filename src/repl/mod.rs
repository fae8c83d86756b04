//! Interactive REPL for the SQL tutor client.
//!
//! Provides a readline-based interface with:
//! - Command history
//! - Mode commands (/explain, /practice, /daily) and free-text submission
//! - Streaming explanation display (plain while streaming, formatted once
//!   the stream finalizes)
//! - Recommendation acceptance (/accept)

pub mod colors;
pub mod markdown;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::types::{LeaderboardEntry, Question};
use crate::api::TutorApi;
use crate::config;
use crate::error::{ApiError, SessionError};
use crate::session::{Mode, Outcome, SessionController};

/// What the loop should do after handling one line.
enum Flow {
    Continue,
    Quit,
    /// Credentials rejected; tear the session down.
    Logout,
}

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    api: Arc<dyn TutorApi>,
    controller: SessionController,
    /// Recommendation surfaced by the most recent explain, kept until
    /// accepted or superseded by the next action.
    pending_recommendation: Option<Question>,
    history_path: PathBuf,
}

impl Repl {
    pub fn new(api: Arc<dyn TutorApi>, controller: SessionController) -> Result<Self> {
        let editor = DefaultEditor::new()?;
        let history_path = config::config_dir().join("history");
        Ok(Self {
            editor,
            api,
            controller,
            pending_recommendation: None,
            history_path,
        })
    }

    fn load_history(&mut self) {
        if self.history_path.exists() {
            let _ = self.editor.load_history(&self.history_path);
        }
    }

    fn save_history(&mut self) {
        if let Some(parent) = self.history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = self.editor.save_history(&self.history_path);
    }

    /// Run the REPL loop until quit, EOF or logout.
    pub async fn run(&mut self) -> Result<()> {
        self.load_history();

        println!("Pick a mode to start: /explain, /practice or /daily (/help for everything)");
        println!();

        loop {
            let mode = self.controller.snapshot().await.mode;
            let prompt = colors::prompt(mode.map(Mode::label));

            let line = match self.editor.readline(&prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            self.editor.add_history_entry(&line)?;

            let flow = if trimmed.starts_with('/') {
                self.handle_command(trimmed).await?
            } else {
                self.handle_submit(trimmed).await?
            };

            match flow {
                Flow::Continue => {}
                Flow::Quit => break,
                Flow::Logout => {
                    println!("{}", colors::error("Session expired - please log in again."));
                    break;
                }
            }
        }

        self.save_history();
        println!("Goodbye!");
        Ok(())
    }

    async fn handle_command(&mut self, cmd: &str) -> Result<Flow> {
        let parts: Vec<&str> = cmd.splitn(2, ' ').collect();
        let command = parts[0];
        let arg = parts.get(1).copied().unwrap_or("").trim();

        match command {
            "/help" => {
                println!("Commands:");
                println!("  /explain            - Explain mode: type a SQL topic to learn about");
                println!("  /practice           - Practice mode: topics to draw a question, then your SQL answer");
                println!("  /daily              - Daily mode: fetches your personalized question");
                println!("  /accept             - Accept the recommended question after an explanation");
                println!("  /status             - Show mode, open question and schema context");
                println!("  /leaderboard        - Show the daily leaderboard");
                println!("  /provider <name>    - Switch LLM provider ({})", config::PROVIDERS.join(", "));
                println!("  /personalize on|off - Toggle post-explain recommendations");
                println!("  /help               - Show this help");
                println!("  /quit               - Exit");
            }
            "/explain" => {
                self.pending_recommendation = None;
                self.controller.set_mode(Mode::Explain).await;
                println!("{}", colors::status("Explain mode. Type a SQL topic you want explained."));
            }
            "/practice" => {
                self.pending_recommendation = None;
                self.controller.set_mode(Mode::Practice).await;
                println!(
                    "{}",
                    colors::status(
                        "Practice mode. Enter topics (comma-separated) to draw a question."
                    )
                );
            }
            "/daily" => {
                self.pending_recommendation = None;
                println!("{}", colors::status("Fetching your personalized daily question..."));
                match self.controller.start_daily().await {
                    Ok(outcome) => return self.render_outcome(outcome).await,
                    Err(e) => return self.render_error(e),
                }
            }
            "/accept" => match self.pending_recommendation.take() {
                Some(question) => {
                    self.controller.accept_recommendation(&question).await;
                    println!("{}", colors::success("Challenge accepted - switched to practice mode."));
                    print_question(&question);
                    println!("{}", colors::status("Type your SQL answer."));
                }
                None => {
                    println!("{}", colors::warning("No recommendation to accept right now."));
                }
            },
            "/status" => {
                let view = self.controller.snapshot().await;
                println!(
                    "Mode:        {}",
                    view.mode.map(Mode::label).unwrap_or("(none)")
                );
                println!(
                    "Question:    {}",
                    if view.question_open { "open" } else { "none - fetch one first" }
                );
                match view.schema_text {
                    Some(schema) => println!("Schema:\n{}", colors::status(&schema)),
                    None => println!("Schema:      (no question loaded)"),
                }
                if let Some(user) = view.user {
                    println!("Signed in:   {} ({} points)", user.username, user.points);
                }
                println!("Provider:    {}", view.provider);
                println!(
                    "Personalize: {}",
                    if view.personalize { "on" } else { "off" }
                );
            }
            "/leaderboard" => match self.api.fetch_leaderboard().await {
                Ok(entries) => print_leaderboard(&entries),
                Err(ApiError::Unauthorized) => return Ok(Flow::Logout),
                Err(e) => println!("{}", colors::error(&format!("Leaderboard unavailable: {}", e))),
            },
            "/provider" => {
                if config::PROVIDERS.contains(&arg) {
                    self.controller.set_provider(arg.to_string()).await;
                    println!("{}", colors::success(&format!("Provider set to {}.", arg)));
                } else {
                    println!(
                        "{}",
                        colors::warning(&format!(
                            "Unknown provider {:?}. Available: {}",
                            arg,
                            config::PROVIDERS.join(", ")
                        ))
                    );
                }
            }
            "/personalize" => match arg {
                "on" => {
                    self.controller.set_personalize(true).await;
                    println!("{}", colors::success("Personalized recommendations on."));
                }
                "off" => {
                    self.controller.set_personalize(false).await;
                    println!("{}", colors::success("Personalized recommendations off."));
                }
                _ => println!("Usage: /personalize on|off"),
            },
            "/quit" | "/exit" => return Ok(Flow::Quit),
            _ => {
                println!("Unknown command: {}. Try /help", command);
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_submit(&mut self, input: &str) -> Result<Flow> {
        // Any new submission supersedes an unaccepted recommendation.
        self.pending_recommendation = None;

        let mode = self.controller.snapshot().await.mode;
        if mode == Some(Mode::Explain) {
            println!();
        }

        let result = self
            .controller
            .submit(input, |delta: &str| {
                print!("{}", delta);
                let _ = io::stdout().flush();
            })
            .await;

        match result {
            Ok(outcome) => self.render_outcome(outcome).await,
            Err(e) => self.render_error(e),
        }
    }

    async fn render_outcome(&mut self, outcome: Outcome) -> Result<Flow> {
        match outcome {
            Outcome::Explanation {
                text,
                truncated,
                recommendation,
            } => {
                println!();
                print!("{}", explanation_block(&text, truncated));
                if let Some(question) = recommendation {
                    println!();
                    println!("{}", colors::header("Recommended for you:"));
                    print_question(&question);
                    println!("{}", colors::status("Type /accept to take it on."));
                    self.pending_recommendation = Some(question);
                }
            }
            Outcome::QuestionLoaded(question) => {
                print_question(&question);
                println!("{}", colors::status("Question loaded. Type your SQL answer."));
            }
            Outcome::PracticeGraded(verdict) => {
                let headline = format!("Verdict: {}", verdict.message);
                if verdict.status == crate::api::types::PracticeStatus::Correct {
                    println!("{}", colors::success(&headline));
                } else {
                    println!("{}", colors::warning(&headline));
                }
                if let Some(analysis) = verdict.analysis {
                    println!("{}", colors::header("Tutor analysis:"));
                    println!("{}", colors::status(&analysis));
                }
                println!(
                    "{}",
                    colors::status("Question closed. Enter topics to draw another.")
                );
            }
            Outcome::DailyGraded { verdict, refreshed } => {
                if verdict.status.is_solved() {
                    println!("{}", colors::success(&verdict.message));
                } else {
                    println!("{}", colors::warning(&verdict.message));
                    println!("{}", colors::status("The question stays open - try again."));
                }
                if let Some((user, leaderboard)) = refreshed {
                    println!(
                        "{}",
                        colors::success(&format!(
                            "{} now has {} points.",
                            user.username, user.points
                        ))
                    );
                    print_leaderboard(&leaderboard);
                }
            }
            Outcome::Superseded => {
                // The session moved on while this call was in flight;
                // nothing to show.
            }
        }
        Ok(Flow::Continue)
    }

    fn render_error(&self, err: SessionError) -> Result<Flow> {
        if err.is_unauthorized() {
            return Ok(Flow::Logout);
        }
        if err.is_user_recoverable() {
            println!("{}", colors::warning(&err.to_string()));
        } else {
            println!("{}", colors::error(&format!("Request failed: {}", err)));
        }
        Ok(Flow::Continue)
    }
}

/// One-time formatted re-render of the finalized explanation. Whatever text
/// accumulated comes first; a truncation notice, when one applies, follows it.
fn explanation_block(text: &str, truncated: bool) -> String {
    let mut out = String::new();
    if !text.is_empty() {
        out.push_str(&colors::separator(50));
        out.push('\n');
        out.push_str(&markdown::render(text));
        out.push('\n');
        out.push_str(&colors::separator(50));
        out.push('\n');
    }
    if truncated {
        out.push_str(&colors::error("[stream interrupted - showing what arrived]"));
        out.push('\n');
    }
    out
}

fn print_question(question: &Question) {
    println!();
    println!("{}", colors::header(&format!("Question: {}", question.title)));
    println!("{}", question.question_text);
    if !question.setup_sql.is_empty() {
        println!();
        println!("{}", colors::header("Schema:"));
        println!("{}", colors::status(&question.setup_sql));
    }
    println!();
}

/// Print the daily leaderboard: rank, name, points.
pub fn print_leaderboard(entries: &[LeaderboardEntry]) {
    if entries.is_empty() {
        println!("{}", colors::status("Leaderboard is empty."));
        return;
    }
    println!("{}", colors::header("Leaderboard:"));
    for entry in entries {
        println!("  {}. {} - {} points", entry.rank, entry.username, entry.points);
    }
}
