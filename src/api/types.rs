//! Wire types for the tutoring backend.
//!
//! Field names mirror the server's JSON exactly (`question_id`, `setup_sql`,
//! `user_sql`, `llm_provider`), so these types are the single place where the
//! wire contract lives.

use serde::{Deserialize, Serialize};

/// Profile returned by `/auth/users/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub points: i64,
}

/// One row of `/daily/leaderboard`.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub username: String,
    pub points: i64,
}

/// A question as served to learners.
///
/// `setup_sql` doubles as the schema context shown while the question is
/// open. The same shape is returned by the topic fetch, the personalized
/// daily fetch, and the post-explain recommendation.
#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub question_id: i64,
    pub title: String,
    pub question_text: String,
    pub setup_sql: String,
    #[serde(default)]
    pub topics: String,
}

/// Body of `POST /test/get-question`.
#[derive(Debug, Serialize)]
pub struct GetQuestionRequest {
    pub topics: Vec<String>,
}

/// Body of both answer-submission endpoints.
#[derive(Debug, Serialize)]
pub struct AnswerSubmission<'a> {
    pub question_id: i64,
    pub user_sql: &'a str,
}

/// Body of `POST /chat/explain`.
#[derive(Debug, Serialize)]
pub struct ExplainRequest<'a> {
    pub topic: &'a str,
    pub llm_provider: &'a str,
}

/// Grading status for a practice attempt. Every status is terminal: the
/// attempt is over whichever one comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeStatus {
    Correct,
    SyntaxError,
    ResultError,
}

/// Verdict from `POST /test/submit-answer`.
#[derive(Debug, Clone, Deserialize)]
pub struct PracticeVerdict {
    pub status: PracticeStatus,
    pub message: String,
    #[serde(default)]
    pub analysis: Option<String>,
}

/// Grading status for a daily attempt. Only `Correct` and `AlreadySolved`
/// close the question; the error statuses leave it open for another try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyStatus {
    Correct,
    SyntaxError,
    ResultError,
    AlreadySolved,
}

impl DailyStatus {
    /// Whether this verdict resolves the open question.
    pub fn is_solved(self) -> bool {
        matches!(self, DailyStatus::Correct | DailyStatus::AlreadySolved)
    }
}

/// Verdict from `POST /daily/submit-personalized-answer`.
#[derive(Debug, Clone, Deserialize)]
pub struct DailyVerdict {
    pub status: DailyStatus,
    pub message: String,
}

/// One event on an explain stream.
///
/// Fragments arrive in order and are never re-delivered; `Done` marks a clean
/// end-of-stream, `Error` a truncation. Exactly one of the two terminates
/// every stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Fragment(String),
    Done,
    Error(String),
}
