//! Session state types.

use crate::api::types::{DailyVerdict, LeaderboardEntry, PracticeVerdict, Question, UserProfile};

/// The learner's selected interaction mode. `None` on the session means no
/// mode has been picked yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Explain,
    Practice,
    Daily,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Explain => "explain",
            Mode::Practice => "practice",
            Mode::Daily => "daily",
        }
    }
}

/// A question that has been fetched and not yet terminally resolved. Its
/// presence gates how free-text input is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenQuestion {
    pub question_id: i64,
    pub schema_text: String,
}

impl From<&Question> for OpenQuestion {
    fn from(q: &Question) -> Self {
        Self {
            question_id: q.question_id,
            schema_text: q.setup_sql.clone(),
        }
    }
}

/// The session proper. One per authenticated run; owned by the controller
/// and never shared mutably with anything else.
///
/// `epoch` is bumped on every mode change. Async results captured under an
/// older epoch are discarded at apply time instead of mutating state that
/// has moved on.
#[derive(Debug, Default)]
pub struct Session {
    pub mode: Option<Mode>,
    pub open_question: Option<OpenQuestion>,
    pub user: Option<UserProfile>,
    pub provider: String,
    pub personalize: bool,
    pub(crate) epoch: u64,
}

/// Read-only snapshot handed to the presentation layer for re-rendering.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub mode: Option<Mode>,
    /// Schema context of the open question, if any.
    pub schema_text: Option<String>,
    pub question_open: bool,
    pub user: Option<UserProfile>,
    pub provider: String,
    pub personalize: bool,
}

impl Session {
    pub(crate) fn view(&self) -> SessionView {
        SessionView {
            mode: self.mode,
            schema_text: self
                .open_question
                .as_ref()
                .map(|q| q.schema_text.clone()),
            question_open: self.open_question.is_some(),
            user: self.user.clone(),
            provider: self.provider.clone(),
            personalize: self.personalize,
        }
    }
}

/// What a submission (or daily fetch) produced, for the presentation layer
/// to render.
#[derive(Debug)]
pub enum Outcome {
    /// A finished explain stream: the full accumulated text (already shown
    /// incrementally), whether it was truncated by a transport error, and an
    /// optional recommendation to pivot into practice.
    Explanation {
        text: String,
        truncated: bool,
        recommendation: Option<Question>,
    },
    /// A question was fetched and is now open.
    QuestionLoaded(Question),
    /// Terminal practice verdict; the question is closed either way.
    PracticeGraded(PracticeVerdict),
    /// Daily verdict. `refreshed` carries the new profile and leaderboard
    /// when the answer resolved the question.
    DailyGraded {
        verdict: DailyVerdict,
        refreshed: Option<(UserProfile, Vec<LeaderboardEntry>)>,
    },
    /// The session moved on (mode switch) while this call was in flight;
    /// its result was discarded without touching state.
    Superseded,
}
