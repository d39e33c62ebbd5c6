//! Refresh-and-retry coordination for expired sessions.
//!
//! A 401 on a first attempt triggers exactly one refresh. If the refresh
//! succeeds the original request is replayed once with `retry_count`
//! incremented, and its result is returned as-is. A second 401 from the
//! replay is an ordinary failure: the gateway never refreshes for an attempt
//! that is already a retry.

use http::header::CONTENT_TYPE;
use tracing::{info, warn};

use crate::csrf::CSRF_HEADER;
use crate::error::{Failure, REFRESH_EXHAUSTED, REFRESH_FAILED, REFRESH_NETWORK_FAILURE};
use crate::gateway::{ApiRequest, Gateway, read_json};
use crate::response::{ApiResponse, error_message};

/// Replays allowed per original call.
pub const MAX_REFRESH_RETRIES: u32 = 1;

/// What happened to the session refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The session was refreshed and the request replayed. The replay's
    /// result may still be a failure.
    Replayed,
    /// No replay happened: retries exhausted, refresh rejected or
    /// unreachable.
    Rejected,
}

/// Refreshes the session and replays `request`.
pub async fn refresh_and_retry(
    gateway: &Gateway,
    request: ApiRequest,
    retry_count: u32,
) -> (RefreshOutcome, ApiResponse) {
    if retry_count >= MAX_REFRESH_RETRIES {
        warn!(retry_count, "refresh skipped, retry budget spent");
        return (
            RefreshOutcome::Rejected,
            ApiResponse::fail(Failure::Refresh, REFRESH_EXHAUSTED),
        );
    }

    let token = gateway.csrf().ensure_csrf().await;
    let token = if token.is_empty() {
        gateway.csrf().token_from_cookie()
    } else {
        token
    };

    let mut builder = gateway
        .http()
        .post(gateway.refresh_url().clone())
        .header(CONTENT_TYPE, "application/json");
    if !token.is_empty() {
        builder = builder.header(CSRF_HEADER, token);
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(error) => {
            warn!(%error, "token refresh request failed");
            return (
                RefreshOutcome::Rejected,
                ApiResponse::fail(Failure::Refresh, REFRESH_NETWORK_FAILURE),
            );
        }
    };

    let status = response.status();
    if status.is_success() {
        info!("token refreshed, replaying request");
        let replayed = gateway.execute(request, retry_count + 1).await;
        return (RefreshOutcome::Replayed, replayed);
    }

    warn!(status = %status, "token refresh rejected");
    let data = read_json(response).await.ok().flatten();
    let message = data
        .as_ref()
        .and_then(error_message)
        .or_else(|| status.canonical_reason().map(str::to_owned))
        .unwrap_or_else(|| REFRESH_FAILED.to_owned());
    (
        RefreshOutcome::Rejected,
        ApiResponse::rejected(Failure::Refresh, data, message),
    )
}
