//! End-to-end session behavior against a scripted backend: mode dispatch,
//! question lifecycle, retry policy, staleness discard and recommendation
//! acceptance.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

use sqltutor::api::types::{
    DailyStatus, DailyVerdict, LeaderboardEntry, PracticeStatus, PracticeVerdict, Question,
    StreamEvent, UserProfile,
};
use sqltutor::api::TutorApi;
use sqltutor::error::{ApiError, ApiResult, SessionError};
use sqltutor::session::{Mode, Outcome, SessionController};

/// Scripted backend. Each endpoint pops its next scripted response; every
/// call is recorded by name so tests can assert on traffic (or its absence).
#[derive(Default)]
struct MockApi {
    questions: Mutex<VecDeque<ApiResult<Question>>>,
    daily_questions: Mutex<VecDeque<ApiResult<Question>>>,
    practice_verdicts: Mutex<VecDeque<ApiResult<PracticeVerdict>>>,
    daily_verdicts: Mutex<VecDeque<ApiResult<DailyVerdict>>>,
    explain_scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
    recommendations: Mutex<VecDeque<ApiResult<Question>>>,
    /// Scripted profile responses; empty means the default profile.
    users: Mutex<VecDeque<ApiResult<UserProfile>>>,
    calls: Mutex<Vec<&'static str>>,
    /// When set, question fetches and explain streams park here until the
    /// test releases them, so a mode switch can happen mid-flight.
    gate: Option<Arc<Notify>>,
}

impl MockApi {
    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

fn question(id: i64, schema: &str) -> Question {
    Question {
        question_id: id,
        title: format!("Question #{}", id),
        question_text: "Write the query.".into(),
        setup_sql: schema.into(),
        topics: "join".into(),
    }
}

fn user(points: i64) -> UserProfile {
    UserProfile {
        id: 1,
        username: "ada".into(),
        is_admin: false,
        points,
    }
}

#[async_trait]
impl TutorApi for MockApi {
    async fn fetch_current_user(&self) -> ApiResult<UserProfile> {
        self.record("fetch_current_user");
        self.users
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(user(30)))
    }

    async fn fetch_leaderboard(&self) -> ApiResult<Vec<LeaderboardEntry>> {
        self.record("fetch_leaderboard");
        Ok(vec![LeaderboardEntry {
            rank: 1,
            username: "ada".into(),
            points: 30,
        }])
    }

    async fn fetch_question_by_topics(&self, _topics: &[String]) -> ApiResult<Question> {
        self.record("fetch_question_by_topics");
        self.wait_gate().await;
        self.questions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ApiError::NoMatch))
    }

    async fn submit_practice_answer(
        &self,
        _question_id: i64,
        _sql: &str,
    ) -> ApiResult<PracticeVerdict> {
        self.record("submit_practice_answer");
        self.practice_verdicts
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted practice submission")
    }

    async fn fetch_daily_question(&self) -> ApiResult<Question> {
        self.record("fetch_daily_question");
        self.wait_gate().await;
        self.daily_questions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ApiError::NoMatch))
    }

    async fn submit_daily_answer(&self, _question_id: i64, _sql: &str) -> ApiResult<DailyVerdict> {
        self.record("submit_daily_answer");
        self.daily_verdicts
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted daily submission")
    }

    async fn stream_explanation(
        &self,
        _topic: &str,
        _provider: &str,
    ) -> ApiResult<mpsc::Receiver<StreamEvent>> {
        self.record("stream_explanation");
        let events = self
            .explain_scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted explain stream");
        let gate = self.gate.clone();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn fetch_recommendation(&self, _topic: &str) -> ApiResult<Question> {
        self.record("fetch_recommendation");
        self.recommendations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ApiError::NoMatch))
    }
}

fn controller_over(api: Arc<MockApi>) -> SessionController {
    SessionController::new(api, "deepseek".into(), false)
}

fn discard(_: &str) {}

#[tokio::test]
async fn submit_without_mode_fails_and_makes_no_call() {
    let api = Arc::new(MockApi::default());
    let controller = controller_over(Arc::clone(&api));

    let err = controller.submit("SELECT 1", discard).await.unwrap_err();
    assert!(matches!(err, SessionError::NoModeSelected));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn mode_switch_always_clears_open_question() {
    let api = Arc::new(MockApi::default());
    api.questions
        .lock()
        .unwrap()
        .push_back(Ok(question(7, "CREATE TABLE a (id INTEGER);")));
    let controller = controller_over(Arc::clone(&api));

    controller.set_mode(Mode::Practice).await;
    let outcome = controller.submit("joins", discard).await.unwrap();
    assert!(matches!(outcome, Outcome::QuestionLoaded(_)));
    assert!(controller.snapshot().await.question_open);

    let view = controller.set_mode(Mode::Explain).await;
    assert!(!view.question_open);
    assert!(view.schema_text.is_none());
}

#[tokio::test]
async fn practice_fetch_failure_reports_and_keeps_mode() {
    let api = Arc::new(MockApi::default());
    let controller = controller_over(Arc::clone(&api));

    controller.set_mode(Mode::Practice).await;
    let err = controller.submit("nonexistent-topic", discard).await.unwrap_err();
    assert!(matches!(err, SessionError::Api(ApiError::NoMatch)));

    let view = controller.snapshot().await;
    assert_eq!(view.mode, Some(Mode::Practice));
    assert!(!view.question_open);
}

#[tokio::test]
async fn practice_verdicts_are_terminal_either_way() {
    for status in [PracticeStatus::Correct, PracticeStatus::ResultError] {
        let api = Arc::new(MockApi::default());
        api.questions
            .lock()
            .unwrap()
            .push_back(Ok(question(7, "CREATE TABLE a (id INTEGER);")));
        api.practice_verdicts.lock().unwrap().push_back(Ok(PracticeVerdict {
            status,
            message: "graded".into(),
            analysis: None,
        }));
        let controller = controller_over(Arc::clone(&api));

        controller.set_mode(Mode::Practice).await;
        controller.submit("joins", discard).await.unwrap();
        let outcome = controller.submit("SELECT * FROM a", discard).await.unwrap();

        assert!(matches!(outcome, Outcome::PracticeGraded(_)));
        assert!(
            !controller.snapshot().await.question_open,
            "open question must clear after terminal verdict {:?}",
            status
        );
    }
}

#[tokio::test]
async fn practice_transport_failure_leaves_question_open() {
    let api = Arc::new(MockApi::default());
    api.questions
        .lock()
        .unwrap()
        .push_back(Ok(question(7, "CREATE TABLE a (id INTEGER);")));
    api.practice_verdicts.lock().unwrap().push_back(Err(ApiError::Api {
        status: 500,
        detail: "boom".into(),
    }));
    let controller = controller_over(Arc::clone(&api));

    controller.set_mode(Mode::Practice).await;
    controller.submit("joins", discard).await.unwrap();
    let err = controller.submit("SELECT 1", discard).await.unwrap_err();

    assert!(matches!(err, SessionError::Api(ApiError::Api { status: 500, .. })));
    // No terminal verdict arrived, so the attempt is still live.
    assert!(controller.snapshot().await.question_open);
}

#[tokio::test]
async fn daily_without_question_rejects_input() {
    let api = Arc::new(MockApi::default());
    let controller = controller_over(Arc::clone(&api));

    controller.set_mode(Mode::Daily).await;
    let err = controller.submit("SELECT 1", discard).await.unwrap_err();
    assert!(matches!(err, SessionError::NoQuestionLoaded));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn daily_incorrect_keeps_question_open_for_retry() {
    let api = Arc::new(MockApi::default());
    api.daily_questions
        .lock()
        .unwrap()
        .push_back(Ok(question(11, "CREATE TABLE d (id INTEGER);")));
    api.daily_verdicts.lock().unwrap().push_back(Ok(DailyVerdict {
        status: DailyStatus::ResultError,
        message: "not quite".into(),
    }));
    let controller = controller_over(Arc::clone(&api));

    controller.start_daily().await.unwrap();
    let outcome = controller.submit("SELECT 2", discard).await.unwrap();

    match outcome {
        Outcome::DailyGraded { verdict, refreshed } => {
            assert_eq!(verdict.status, DailyStatus::ResultError);
            assert!(refreshed.is_none());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(controller.snapshot().await.question_open);
    assert!(!api.calls().contains(&"fetch_current_user"));
}

#[tokio::test]
async fn daily_solved_clears_question_and_refreshes_profile() {
    for status in [DailyStatus::Correct, DailyStatus::AlreadySolved] {
        let api = Arc::new(MockApi::default());
        api.daily_questions
            .lock()
            .unwrap()
            .push_back(Ok(question(11, "CREATE TABLE d (id INTEGER);")));
        api.daily_verdicts.lock().unwrap().push_back(Ok(DailyVerdict {
            status,
            message: "solved".into(),
        }));
        let controller = controller_over(Arc::clone(&api));

        controller.start_daily().await.unwrap();
        let outcome = controller.submit("SELECT 1", discard).await.unwrap();

        match outcome {
            Outcome::DailyGraded { refreshed, .. } => {
                let (user, leaderboard) = refreshed.expect("profile refresh expected");
                assert_eq!(user.points, 30);
                assert_eq!(leaderboard.len(), 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!controller.snapshot().await.question_open);
        assert_eq!(controller.snapshot().await.user.unwrap().points, 30);
        assert!(api.calls().contains(&"fetch_current_user"));
        assert!(api.calls().contains(&"fetch_leaderboard"));
    }
}

#[tokio::test]
async fn daily_refresh_failure_keeps_solved_verdict() {
    let api = Arc::new(MockApi::default());
    api.daily_questions
        .lock()
        .unwrap()
        .push_back(Ok(question(11, "CREATE TABLE d (id INTEGER);")));
    api.daily_verdicts.lock().unwrap().push_back(Ok(DailyVerdict {
        status: DailyStatus::Correct,
        message: "solved".into(),
    }));
    api.users.lock().unwrap().push_back(Err(ApiError::Api {
        status: 500,
        detail: "boom".into(),
    }));
    let controller = controller_over(Arc::clone(&api));

    controller.start_daily().await.unwrap();
    let outcome = controller.submit("SELECT 1", discard).await.unwrap();

    // The answer already solved the question; a broken standings refresh
    // only costs the points display, never the verdict.
    match outcome {
        Outcome::DailyGraded { verdict, refreshed } => {
            assert_eq!(verdict.status, DailyStatus::Correct);
            assert!(refreshed.is_none());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!controller.snapshot().await.question_open);
}

#[tokio::test]
async fn daily_refresh_unauthorized_still_logs_out() {
    let api = Arc::new(MockApi::default());
    api.daily_questions
        .lock()
        .unwrap()
        .push_back(Ok(question(11, "CREATE TABLE d (id INTEGER);")));
    api.daily_verdicts.lock().unwrap().push_back(Ok(DailyVerdict {
        status: DailyStatus::Correct,
        message: "solved".into(),
    }));
    api.users.lock().unwrap().push_back(Err(ApiError::Unauthorized));
    let controller = controller_over(Arc::clone(&api));

    controller.start_daily().await.unwrap();
    let err = controller.submit("SELECT 1", discard).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn stale_daily_fetch_is_discarded_after_mode_switch() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(MockApi {
        gate: Some(Arc::clone(&gate)),
        ..MockApi::default()
    });
    api.daily_questions
        .lock()
        .unwrap()
        .push_back(Ok(question(11, "CREATE TABLE d (id INTEGER);")));
    let controller = controller_over(Arc::clone(&api));

    let starting = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start_daily().await })
    };
    tokio::task::yield_now().await;
    controller.set_mode(Mode::Practice).await;
    gate.notify_one();

    let outcome = starting.await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::Superseded));

    let view = controller.snapshot().await;
    assert_eq!(view.mode, Some(Mode::Practice));
    assert!(!view.question_open, "daily fetch must not land in practice mode");
}

#[tokio::test]
async fn stale_question_fetch_is_discarded_after_mode_switch() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(MockApi {
        gate: Some(Arc::clone(&gate)),
        ..MockApi::default()
    });
    api.questions
        .lock()
        .unwrap()
        .push_back(Ok(question(7, "CREATE TABLE a (id INTEGER);")));
    let controller = controller_over(Arc::clone(&api));

    controller.set_mode(Mode::Practice).await;
    let submitting = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.submit("topicA", |_: &str| {}).await })
    };
    // Let the fetch get issued, then switch modes out from under it.
    tokio::task::yield_now().await;
    controller.set_mode(Mode::Daily).await;
    gate.notify_one();

    let outcome = submitting.await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::Superseded));

    let view = controller.snapshot().await;
    assert_eq!(view.mode, Some(Mode::Daily));
    assert!(!view.question_open, "stale fetch must not resurrect a question");
}

#[tokio::test]
async fn finalized_explanation_surfaces_recommendation_for_acceptance() {
    let api = Arc::new(MockApi::default());
    api.explain_scripts.lock().unwrap().push_back(vec![
        StreamEvent::Fragment("SEL".into()),
        StreamEvent::Fragment("ECT ".into()),
        StreamEvent::Fragment("1".into()),
        StreamEvent::Done,
    ]);
    api.recommendations
        .lock()
        .unwrap()
        .push_back(Ok(question(42, "CREATE TABLE r (id INTEGER);")));
    let controller = SessionController::new(Arc::clone(&api) as Arc<dyn TutorApi>, "deepseek".into(), true);

    controller.set_mode(Mode::Explain).await;
    let outcome = controller.submit("select basics", discard).await.unwrap();

    let recommendation = match outcome {
        Outcome::Explanation {
            text,
            truncated,
            recommendation,
        } => {
            assert_eq!(text, "SELECT 1");
            assert!(!truncated);
            recommendation.expect("recommendation expected")
        }
        other => panic!("unexpected outcome: {:?}", other),
    };

    let view = controller.accept_recommendation(&recommendation).await;
    assert_eq!(view.mode, Some(Mode::Practice));
    assert!(view.question_open);
    assert_eq!(view.schema_text.as_deref(), Some("CREATE TABLE r (id INTEGER);"));
}

#[tokio::test]
async fn recommendation_is_dropped_when_mode_changes_mid_explain() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(MockApi {
        gate: Some(Arc::clone(&gate)),
        ..MockApi::default()
    });
    api.explain_scripts.lock().unwrap().push_back(vec![
        StreamEvent::Fragment("joins...".into()),
        StreamEvent::Done,
    ]);
    api.recommendations
        .lock()
        .unwrap()
        .push_back(Ok(question(42, "CREATE TABLE r (id INTEGER);")));
    let controller = SessionController::new(Arc::clone(&api) as Arc<dyn TutorApi>, "deepseek".into(), true);

    controller.set_mode(Mode::Explain).await;
    let submitting = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.submit("joins", |_: &str| {}).await })
    };
    tokio::task::yield_now().await;
    controller.set_mode(Mode::Practice).await;
    gate.notify_one();

    let outcome = submitting.await.unwrap().unwrap();
    match outcome {
        Outcome::Explanation { recommendation, .. } => {
            assert!(recommendation.is_none(), "stale recommendation must be dropped");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn explain_leaves_open_question_rules_alone() {
    // Explain mode never owns a question: after an explanation the session
    // still refuses answers until practice fetches one.
    let api = Arc::new(MockApi::default());
    api.explain_scripts
        .lock()
        .unwrap()
        .push_back(vec![StreamEvent::Fragment("x".into()), StreamEvent::Done]);
    let controller = controller_over(Arc::clone(&api));

    controller.set_mode(Mode::Explain).await;
    controller.submit("anything", discard).await.unwrap();
    assert!(!controller.snapshot().await.question_open);
}
