//! Streamed-explanation reader.
//!
//! Issues one explain request and turns the chunked body into progressively
//! published fragments plus an optional follow-up recommendation. The
//! contract has two distinct render paths: each fragment goes to the sink
//! as raw text the moment it arrives (partial markup would render wrong
//! mid-token), and the finalized accumulated text is re-rendered once as
//! formatted markup by the caller.

use tracing::{debug, warn};

use crate::api::types::{Question, StreamEvent};
use crate::api::TutorApi;
use crate::error::{ApiError, ApiResult};

/// The finalized result of one explain call.
#[derive(Debug)]
pub struct ExplanationOutcome {
    /// Full accumulated text, equal to the concatenation of every fragment
    /// the sink saw.
    pub text: String,
    /// True when a transport error cut the stream short. Whatever was
    /// accumulated is still returned.
    pub truncated: bool,
    /// Follow-up recommendation, fetched only after a clean finalization
    /// with personalization on. Fetch failure is non-fatal and leaves this
    /// empty.
    pub recommendation: Option<Question>,
}

/// Run one explain request to completion.
///
/// Not restartable; a new call starts an independent stream. Fails with
/// [`ApiError::ExplainRequestFailed`] if the handshake is rejected, before
/// the sink sees anything.
pub async fn run<F>(
    api: &dyn TutorApi,
    topic: &str,
    provider: &str,
    personalize: bool,
    mut on_fragment: F,
) -> ApiResult<ExplanationOutcome>
where
    F: FnMut(&str) + Send,
{
    let mut rx = api.stream_explanation(topic, provider).await?;

    let mut text = String::new();
    let mut finalized_clean = false;

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Fragment(delta) => {
                text.push_str(&delta);
                on_fragment(&delta);
            }
            StreamEvent::Done => {
                finalized_clean = true;
                break;
            }
            StreamEvent::Error(e) => {
                warn!(topic, error = %e, "explain stream truncated");
                break;
            }
        }
    }
    // A sender dropped without a terminal event is a truncation too.

    let recommendation = if personalize && finalized_clean {
        match api.fetch_recommendation(topic).await {
            Ok(q) => Some(q),
            Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized),
            Err(e) => {
                debug!(topic, error = %e, "recommendation fetch failed, suppressing");
                None
            }
        }
    } else {
        None
    };

    Ok(ExplanationOutcome {
        text,
        truncated: !finalized_clean,
        recommendation,
    })
}
