//! The HTTP gateway.
//!
//! Every API call goes through [`Gateway::request`]. In order, a call:
//!
//! 1. asks the [`CircuitBreaker`] for permission and short-circuits with
//!    [`SERVICE_UNAVAILABLE`] while it is open,
//! 2. sends the request through the middleware stack, where
//!    [`CsrfMiddleware`](crate::CsrfMiddleware) attaches the CSRF token to
//!    unsafe methods,
//! 3. on 2xx resets the breaker and returns the parsed body,
//! 4. on a first 401 hands the request to the refresh coordinator, which
//!    refreshes the session once and replays the request once,
//! 5. on anything else records a failure and returns the server's message,
//!    or `HTTP <status>`.
//!
//! Transport errors and undecodable success bodies also count against the
//! breaker. A replay records its own outcome, so a failed replay is counted
//! once.

use futures::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use reqwest::{Response, Url};
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;
use tracing::{Instrument, debug, debug_span, warn};

use crate::breaker::CircuitBreaker;
use crate::csrf::CsrfManager;
use crate::error::{Failure, NETWORK_FAILURE, SERVICE_UNAVAILABLE};
use crate::refresh::{self, RefreshOutcome};
use crate::response::{ApiResponse, error_message};

/// One call to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    url: Url,
    body: Option<Value>,
    refresh_on_unauthorized: bool,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        ApiRequest {
            method,
            url,
            body: None,
            refresh_on_unauthorized: true,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: Url) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Sends `body` as JSON.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// A 401 is returned as-is instead of triggering a session refresh.
    /// Used for credential endpoints, where 401 means wrong credentials.
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn refreshes_on_unauthorized(&self) -> bool {
        self.refresh_on_unauthorized
    }
}

/// Single chokepoint for backend calls.
#[derive(Clone, Debug)]
pub struct Gateway {
    http: ClientWithMiddleware,
    csrf: CsrfManager,
    breaker: CircuitBreaker,
    refresh_url: Url,
}

impl Gateway {
    pub fn new(
        http: ClientWithMiddleware,
        csrf: CsrfManager,
        breaker: CircuitBreaker,
        refresh_url: Url,
    ) -> Self {
        Gateway {
            http,
            csrf,
            breaker,
            refresh_url,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn csrf(&self) -> &CsrfManager {
        &self.csrf
    }

    pub(crate) fn http(&self) -> &ClientWithMiddleware {
        &self.http
    }

    pub(crate) fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }

    /// Runs `request` as a first attempt.
    pub async fn request(&self, request: ApiRequest) -> ApiResponse {
        self.execute(request, 0).await
    }

    /// Runs `request` as attempt number `retry_count`.
    ///
    /// Only a first attempt (`retry_count == 0`) may refresh the session.
    pub fn execute(&self, request: ApiRequest, retry_count: u32) -> BoxFuture<'_, ApiResponse> {
        let span = debug_span!(
            "api.request",
            method = %request.method,
            path = request.url.path(),
            retry_count,
        );
        Box::pin(self.run(request, retry_count).instrument(span))
    }

    async fn run(&self, request: ApiRequest, retry_count: u32) -> ApiResponse {
        if !self.breaker.try_acquire() {
            warn!("circuit open, skipping request");
            return ApiResponse::fail(Failure::CircuitOpen, SERVICE_UNAVAILABLE);
        }

        let response = match self.send(&request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "request failed before a response arrived");
                self.breaker.record_failure();
                return ApiResponse::fail(Failure::Transport, NETWORK_FAILURE);
            }
        };

        let status = response.status();
        debug!(status = %status, "response received");

        if status.is_success() {
            return match read_json(response).await {
                Ok(data) => {
                    self.breaker.record_success();
                    ApiResponse::ok(data.unwrap_or(Value::Null))
                }
                Err(failure) => {
                    self.breaker.record_failure();
                    ApiResponse::fail(failure, NETWORK_FAILURE)
                }
            };
        }

        if status == StatusCode::UNAUTHORIZED
            && retry_count == 0
            && request.refresh_on_unauthorized
        {
            let (outcome, response) = refresh::refresh_and_retry(self, request, retry_count).await;
            if outcome == RefreshOutcome::Rejected {
                self.breaker.record_failure();
            }
            return response;
        }

        self.breaker.record_failure();
        let data = read_json(response).await.ok().flatten();
        let message = data
            .as_ref()
            .and_then(error_message)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        ApiResponse::rejected(Failure::Status(status), data, message)
    }

    async fn send(&self, request: &ApiRequest) -> reqwest_middleware::Result<Response> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }
        builder.send().await
    }
}

/// Reads a JSON body. An empty body is `Ok(None)`.
pub(crate) async fn read_json(response: Response) -> Result<Option<Value>, Failure> {
    let text = response.text().await.map_err(|error| {
        debug!(%error, "failed to read response body");
        Failure::Transport
    })?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&text).map(Some).map_err(|error| {
        debug!(%error, "response body is not JSON");
        Failure::Decode
    })
}
