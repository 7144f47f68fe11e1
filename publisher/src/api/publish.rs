use crate::AppState;
use crate::api::utils::{ApiBody, error_response, read_json_object};
use crate::errors::{PublishError, Result};
use crate::metrics_defs::{PUBLISH_DURATION, PUBLISH_ERRORS};
use crate::reconcile::PublishSummary;
use hyper::body::{Body, Bytes};
use hyper::{Response, StatusCode};
use shared::http::json_response;
use shared::{counter, histogram};
use std::time::Instant;

/// `POST /publish`: reconciles one JSON snapshot and answers with the summary.
pub async fn publish<B>(state: &AppState, body: B) -> Response<ApiBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let result = handle(state, body).await;
    histogram!(PUBLISH_DURATION).record(started.elapsed().as_secs_f64());

    match result {
        Ok(summary) => json_response(StatusCode::OK, &summary),
        Err(e) => {
            counter!(PUBLISH_ERRORS, "kind" => e.kind()).increment(1);
            log_failure(&e);
            error_response(&e)
        }
    }
}

async fn handle<B>(state: &AppState, body: B) -> Result<PublishSummary>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = read_json_object(body).await?;
    let mapping = state.mapping.current()?;
    state.reconciler.publish(&mapping, &body).await
}

fn log_failure(error: &PublishError) {
    if error.status().is_server_error() {
        tracing::error!(error = %error, kind = error.kind(), "Publish failed");
    } else {
        tracing::warn!(error = %error, kind = error.kind(), "Publish rejected");
    }
}
