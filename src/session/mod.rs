//! Session mode state machine.
//!
//! `SessionController` is the single authority for "what does this user
//! input mean right now". It owns the [`Session`] value; the API client and
//! the explanation reader only return results for the controller to apply.
//!
//! Every network call captures the session epoch when it is issued. A mode
//! switch bumps the epoch, so when the call's result finally arrives the
//! controller can tell it is stale and discard it instead of resurrecting
//! state the user already walked away from. There is no transport-level
//! cancellation - "cancelled" means "ignored at apply time".

mod types;

pub use types::{Mode, OpenQuestion, Outcome, Session, SessionView};

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::types::{LeaderboardEntry, Question, UserProfile};
use crate::api::TutorApi;
use crate::error::{ApiError, SessionError};
use crate::explain;

/// Controller handle. Cloneable; clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    api: Arc<dyn TutorApi>,
    session: Arc<Mutex<Session>>,
}

impl SessionController {
    pub fn new(api: Arc<dyn TutorApi>, provider: String, personalize: bool) -> Self {
        let session = Session {
            provider,
            personalize,
            ..Session::default()
        };
        Self {
            api,
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// Current state for rendering.
    pub async fn snapshot(&self) -> SessionView {
        self.session.lock().await.view()
    }

    /// Switch the active mode. Always succeeds; unconditionally drops any
    /// open question and invalidates every in-flight call.
    pub async fn set_mode(&self, mode: Mode) -> SessionView {
        let mut session = self.session.lock().await;
        session.mode = Some(mode);
        session.open_question = None;
        session.epoch += 1;
        session.view()
    }

    /// Record the freshly authenticated profile.
    pub async fn set_user(&self, user: UserProfile) {
        self.session.lock().await.user = Some(user);
    }

    pub async fn set_provider(&self, provider: String) {
        self.session.lock().await.provider = provider;
    }

    pub async fn set_personalize(&self, personalize: bool) {
        self.session.lock().await.personalize = personalize;
    }

    /// Route free-text input according to the active mode and question
    /// presence. `on_fragment` sees explain fragments as they arrive; the
    /// other arms never call it.
    pub async fn submit<F>(
        &self,
        input: &str,
        on_fragment: F,
    ) -> Result<Outcome, SessionError>
    where
        F: FnMut(&str) + Send,
    {
        let (mode, open, epoch, provider, personalize) = {
            let session = self.session.lock().await;
            (
                session.mode,
                session.open_question.clone(),
                session.epoch,
                session.provider.clone(),
                session.personalize,
            )
        };

        match (mode, open) {
            (None, _) => Err(SessionError::NoModeSelected),
            (Some(Mode::Explain), _) => {
                self.run_explain(input, &provider, personalize, epoch, on_fragment)
                    .await
            }
            (Some(Mode::Practice), None) => self.fetch_practice_question(input, epoch).await,
            (Some(Mode::Practice), Some(open)) => {
                self.grade_practice(open.question_id, input, epoch).await
            }
            (Some(Mode::Daily), None) => Err(SessionError::NoQuestionLoaded),
            (Some(Mode::Daily), Some(open)) => {
                self.grade_daily(open.question_id, input, epoch).await
            }
        }
    }

    /// Switch to daily mode and fetch the personalized question in one step.
    pub async fn start_daily(&self) -> Result<Outcome, SessionError> {
        // The mode change and the epoch capture happen under one lock, so a
        // rival switch cannot slip between them and hand the fetch an epoch
        // that survives the switch.
        let epoch = {
            let mut session = self.session.lock().await;
            session.mode = Some(Mode::Daily);
            session.open_question = None;
            session.epoch += 1;
            session.epoch
        };
        let question = self.api.fetch_daily_question().await?;
        Ok(self.install_question(question, epoch).await)
    }

    /// Pivot an explain-time recommendation into an open practice question,
    /// bypassing the topic fetch.
    pub async fn accept_recommendation(&self, question: &Question) -> SessionView {
        let mut session = self.session.lock().await;
        session.mode = Some(Mode::Practice);
        session.epoch += 1;
        session.open_question = Some(OpenQuestion::from(question));
        session.view()
    }

    async fn run_explain<F>(
        &self,
        topic: &str,
        provider: &str,
        personalize: bool,
        epoch: u64,
        on_fragment: F,
    ) -> Result<Outcome, SessionError>
    where
        F: FnMut(&str) + Send,
    {
        let outcome =
            explain::run(self.api.as_ref(), topic, provider, personalize, on_fragment).await?;

        // Explain never owns the open question, so the only stale thing a
        // mode switch can leave behind is the recommendation: accepting it
        // requires a session still receptive to a practice pivot.
        let session = self.session.lock().await;
        let recommendation = if session.epoch == epoch {
            outcome.recommendation
        } else {
            if outcome.recommendation.is_some() {
                debug!("mode changed mid-explain, dropping stale recommendation");
            }
            None
        };

        Ok(Outcome::Explanation {
            text: outcome.text,
            truncated: outcome.truncated,
            recommendation,
        })
    }

    async fn fetch_practice_question(
        &self,
        input: &str,
        epoch: u64,
    ) -> Result<Outcome, SessionError> {
        let topics: Vec<String> = input
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if topics.is_empty() {
            return Err(ApiError::NoMatch.into());
        }

        let question = self.api.fetch_question_by_topics(&topics).await?;
        Ok(self.install_question(question, epoch).await)
    }

    async fn install_question(&self, question: Question, epoch: u64) -> Outcome {
        let mut session = self.session.lock().await;
        if session.epoch != epoch {
            debug!(
                question_id = question.question_id,
                "discarding stale question fetch"
            );
            return Outcome::Superseded;
        }
        session.open_question = Some(OpenQuestion::from(&question));
        Outcome::QuestionLoaded(question)
    }

    async fn grade_practice(
        &self,
        question_id: i64,
        sql: &str,
        epoch: u64,
    ) -> Result<Outcome, SessionError> {
        // A transport failure here leaves the question open: no terminal
        // verdict was ever received.
        let verdict = self.api.submit_practice_answer(question_id, sql).await?;

        let mut session = self.session.lock().await;
        if session.epoch != epoch {
            debug!(question_id, "discarding stale practice verdict");
            return Ok(Outcome::Superseded);
        }
        // Grading is terminal per attempt, correct or not. Re-fetch to try
        // again.
        session.open_question = None;
        Ok(Outcome::PracticeGraded(verdict))
    }

    async fn grade_daily(
        &self,
        question_id: i64,
        sql: &str,
        epoch: u64,
    ) -> Result<Outcome, SessionError> {
        let verdict = self.api.submit_daily_answer(question_id, sql).await?;

        {
            let mut session = self.session.lock().await;
            if session.epoch != epoch {
                debug!(question_id, "discarding stale daily verdict");
                return Ok(Outcome::Superseded);
            }
            if verdict.status.is_solved() {
                session.open_question = None;
            }
            // An unsolved verdict keeps the question open for another try.
        }

        // The verdict is already terminal at this point; a failed standings
        // refresh must not turn a solved answer into an error. Unauthorized
        // still propagates so the REPL can log out.
        let refreshed = if verdict.status.is_solved() {
            match self.refresh_standings().await {
                Ok((user, leaderboard)) => {
                    let mut session = self.session.lock().await;
                    if session.epoch == epoch {
                        session.user = Some(user.clone());
                    }
                    Some((user, leaderboard))
                }
                Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized.into()),
                Err(e) => {
                    warn!(question_id, error = %e, "standings refresh failed after solved daily");
                    None
                }
            }
        } else {
            None
        };

        Ok(Outcome::DailyGraded { verdict, refreshed })
    }

    async fn refresh_standings(&self) -> Result<(UserProfile, Vec<LeaderboardEntry>), ApiError> {
        let user = self.api.fetch_current_user().await?;
        let leaderboard = self.api.fetch_leaderboard().await?;
        Ok((user, leaderboard))
    }
}
