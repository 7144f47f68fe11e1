use crate::api::health::health;
use crate::api::publish::publish;
use crate::api::utils::{ApiBody, detail_response};
use crate::{AppState, PublisherError};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub struct PublisherService {
    state: Arc<AppState>,
}

impl PublisherService {
    pub fn new(state: Arc<AppState>) -> Self {
        PublisherService { state }
    }
}

impl Service<Request<Incoming>> for PublisherService {
    type Response = Response<ApiBody>;
    type Error = PublisherError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let state = self.state.clone();
        Box::pin(async move { Ok(route(&state, req).await) })
    }
}

pub async fn route<B>(state: &AppState, req: Request<B>) -> Response<ApiBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    tracing::debug!(method = %req.method(), path = req.uri().path(), "Request");

    match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => health(),
        (&Method::POST, "/publish") => publish(state, req.into_body()).await,
        (_, "/health" | "/publish") => {
            detail_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }
        _ => detail_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}
