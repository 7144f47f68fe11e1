use crate::api::utils::ApiBody;
use hyper::{Response, StatusCode};
use serde_json::json;
use shared::http::json_response;

/// Liveness only. Neither the store nor the mapping file is consulted.
pub fn health() -> Response<ApiBody> {
    json_response(StatusCode::OK, &json!({"ok": true}))
}
