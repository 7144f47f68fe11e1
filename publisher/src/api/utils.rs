use crate::PublisherError;
use crate::errors::{PublishError, Result};
use crate::payload::Object;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use shared::http::json_response;

pub type ApiBody = BoxBody<Bytes, PublisherError>;

/// Largest request body accepted by `/publish`.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Serialize)]
struct Detail<'a> {
    detail: &'a str,
}

/// `{"detail": ...}` error body.
pub fn detail_response(status: StatusCode, detail: &str) -> Response<ApiBody> {
    json_response(status, &Detail { detail })
}

pub fn error_response(error: &PublishError) -> Response<ApiBody> {
    detail_response(error.status(), &error.to_string())
}

/// Reads at most [`MAX_BODY_BYTES`] and parses them as a JSON object.
pub async fn read_json_object<B>(body: B) -> Result<Object>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            return Err(PublishError::BodyTooLarge(MAX_BODY_BYTES));
        }
        Err(e) => return Err(PublishError::InvalidBody(format!("Could not read body: {e}"))),
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(PublishError::InvalidBody("Body must be a JSON object".into())),
        Err(e) => Err(PublishError::InvalidBody(format!("Invalid JSON body: {e}"))),
    }
}
