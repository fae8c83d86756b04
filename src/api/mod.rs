//! HTTP client for the tutoring backend.
//!
//! [`TutorApi`] is the seam the session controller and the explanation
//! reader talk through; [`HttpApi`] is the real implementation over
//! `reqwest`. Tests substitute their own impls.
//!
//! The explain endpoint streams a chunked plain-text body. The producer side
//! lives here: a spawned task pulls chunks off `bytes_stream()` and forwards
//! them over an mpsc channel, so consumers see an ordered, finite sequence of
//! [`StreamEvent`]s terminated by exactly one `Done` or `Error`.

pub mod types;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::{ApiError, ApiResult};
use self::types::{
    AnswerSubmission, DailyVerdict, ExplainRequest, GetQuestionRequest, LeaderboardEntry,
    PracticeVerdict, Question, StreamEvent, UserProfile,
};

/// Everything the client asks of the backend.
#[async_trait]
pub trait TutorApi: Send + Sync {
    async fn fetch_current_user(&self) -> ApiResult<UserProfile>;

    async fn fetch_leaderboard(&self) -> ApiResult<Vec<LeaderboardEntry>>;

    /// Draw a practice question matching any of the given topics.
    async fn fetch_question_by_topics(&self, topics: &[String]) -> ApiResult<Question>;

    /// Grade a practice answer. The verdict is terminal per attempt.
    async fn submit_practice_answer(
        &self,
        question_id: i64,
        sql: &str,
    ) -> ApiResult<PracticeVerdict>;

    /// Fetch the personalized daily question.
    async fn fetch_daily_question(&self) -> ApiResult<Question>;

    async fn submit_daily_answer(&self, question_id: i64, sql: &str) -> ApiResult<DailyVerdict>;

    /// Open an explain stream. A non-success handshake fails with
    /// [`ApiError::ExplainRequestFailed`] before any fragment is produced.
    async fn stream_explanation(
        &self,
        topic: &str,
        provider: &str,
    ) -> ApiResult<mpsc::Receiver<StreamEvent>>;

    /// Topic-based question recommendation used after a personalized explain.
    async fn fetch_recommendation(&self, topic: &str) -> ApiResult<Question>;
}

/// Real backend client.
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success response to the error taxonomy. `not_found_is_no_match`
    /// is set on the question-fetch endpoints, where 404 means "nothing in the
    /// bank for you", not a broken route.
    async fn check(
        response: reqwest::Response,
        not_found_is_no_match: bool,
    ) -> ApiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 401 {
            return Err(ApiError::Unauthorized);
        }
        if status.as_u16() == 404 && not_found_is_no_match {
            return Err(ApiError::NoMatch);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Api {
            status: status.as_u16(),
            detail: extract_detail(&body),
        })
    }
}

/// Pull the `detail` string out of a FastAPI-style error body, falling back
/// to the raw text.
fn extract_detail(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct Detail {
        detail: String,
    }
    match serde_json::from_str::<Detail>(body) {
        Ok(d) => d.detail,
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl TutorApi for HttpApi {
    async fn fetch_current_user(&self) -> ApiResult<UserProfile> {
        let response = self
            .http
            .get(self.url("/auth/users/me"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::check(response, false).await?.json().await?)
    }

    async fn fetch_leaderboard(&self) -> ApiResult<Vec<LeaderboardEntry>> {
        let response = self
            .http
            .get(self.url("/daily/leaderboard"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::check(response, false).await?.json().await?)
    }

    async fn fetch_question_by_topics(&self, topics: &[String]) -> ApiResult<Question> {
        let response = self
            .http
            .post(self.url("/test/get-question"))
            .bearer_auth(&self.token)
            .json(&GetQuestionRequest {
                topics: topics.to_vec(),
            })
            .send()
            .await?;
        Ok(Self::check(response, true).await?.json().await?)
    }

    async fn submit_practice_answer(
        &self,
        question_id: i64,
        sql: &str,
    ) -> ApiResult<PracticeVerdict> {
        let response = self
            .http
            .post(self.url("/test/submit-answer"))
            .bearer_auth(&self.token)
            .json(&AnswerSubmission {
                question_id,
                user_sql: sql,
            })
            .send()
            .await?;
        Ok(Self::check(response, false).await?.json().await?)
    }

    async fn fetch_daily_question(&self) -> ApiResult<Question> {
        let response = self
            .http
            .get(self.url("/daily/get-personalized-question"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::check(response, true).await?.json().await?)
    }

    async fn submit_daily_answer(&self, question_id: i64, sql: &str) -> ApiResult<DailyVerdict> {
        let response = self
            .http
            .post(self.url("/daily/submit-personalized-answer"))
            .bearer_auth(&self.token)
            .json(&AnswerSubmission {
                question_id,
                user_sql: sql,
            })
            .send()
            .await?;
        Ok(Self::check(response, false).await?.json().await?)
    }

    async fn stream_explanation(
        &self,
        topic: &str,
        provider: &str,
    ) -> ApiResult<mpsc::Receiver<StreamEvent>> {
        let response = self
            .http
            .post(self.url("/chat/explain"))
            .bearer_auth(&self.token)
            .json(&ExplainRequest {
                topic,
                llm_provider: provider,
            })
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::ExplainRequestFailed {
                status: status.as_u16(),
            });
        }

        let (tx, rx) = mpsc::channel(64);
        let stream = response.bytes_stream();

        // Forward decoded chunks until EOF or transport failure. If the
        // receiver goes away we just stop reading; there is no server-side
        // cancellation.
        tokio::spawn(async move {
            futures::pin_mut!(stream);
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        if tx.send(StreamEvent::Fragment(text)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                        return;
                    }
                }
            }
            let _ = tx.send(StreamEvent::Done).await;
        });

        Ok(rx)
    }

    async fn fetch_recommendation(&self, topic: &str) -> ApiResult<Question> {
        self.fetch_question_by_topics(std::slice::from_ref(&topic.to_string()))
            .await
    }
}
