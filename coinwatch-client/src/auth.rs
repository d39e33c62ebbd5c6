//! Credential and session endpoints.

use coinwatch_core::UserProfile;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::client::ApiClient;
use crate::decode::decode_profile;
use crate::error::{
    ApiError, ApiResult, Failure, LOGIN_FAILED, LOGIN_REJECTED, LOGOUT_FAILED, SIGNUP_FAILED,
    VERIFY_FAILED,
};
use crate::gateway::ApiRequest;
use crate::response::ApiResponse;

#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupCredentials {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl ApiClient {
    /// Logs in. Session cookies land in the client's jar.
    ///
    /// A rejected login reports the server's `detail`, `error` or `message`,
    /// falling back to a generic "wrong username or password".
    #[instrument(skip_all)]
    pub async fn login(&self, credentials: &LoginCredentials) -> ApiResult<Value> {
        let request = ApiRequest::post(self.routes.login.clone())
            .with_body(to_body(credentials))
            .without_refresh();
        let response = self.gateway.request(request).await;
        if !response.success {
            warn!(error = ?response.error, "login rejected");
        }
        credential_result(response, LOGIN_REJECTED, LOGIN_FAILED)
    }

    #[instrument(skip_all)]
    pub async fn signup(&self, credentials: &SignupCredentials) -> ApiResult<Value> {
        let request = ApiRequest::post(self.routes.register.clone())
            .with_body(to_body(credentials))
            .without_refresh();
        let response = self.gateway.request(request).await;
        credential_result(response, SIGNUP_FAILED, SIGNUP_FAILED)
    }

    /// Submits the emailed verification code. Every failure collapses to one
    /// message.
    #[instrument(skip_all)]
    pub async fn verify_email(&self, code: &str) -> ApiResult<Value> {
        self.try_verify_email(code).await.map_err(|error| {
            warn!(%error, "email verification failed");
            error.with_message(VERIFY_FAILED)
        })
    }

    async fn try_verify_email(&self, code: &str) -> ApiResult<Value> {
        let request = ApiRequest::post(self.routes.verify_email.clone())
            .with_body(serde_json::json!({ "code": code }))
            .without_refresh();
        let body = self.gateway.request(request).await.into_result()?;
        Ok(body)
    }

    /// Refreshes the session explicitly.
    pub async fn refresh_token(&self) -> ApiResult<()> {
        let request = ApiRequest::post(self.routes.refresh.clone()).without_refresh();
        self.gateway.request(request).await.into_result().map(drop)
    }

    pub async fn logout(&self) -> ApiResult<()> {
        let request = ApiRequest::post(self.routes.logout.clone());
        let response = self.gateway.request(request).await;
        if response.success {
            info!("logged out");
        }
        response.into_result().map(drop).map_err(|error| match error.failure() {
            Failure::Transport => error.with_message(LOGOUT_FAILED),
            _ => error,
        })
    }

    /// Fetches the current user's profile.
    pub async fn profile(&self) -> ApiResult<UserProfile> {
        let request = ApiRequest::get(self.routes.profile.clone());
        let body = self.gateway.request(request).await.into_result()?;
        decode_profile(body)
    }
}

fn to_body<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Rejections prefer the server's message over `rejected`; transport
/// failures use `unreachable`. Circuit-open keeps the gateway message.
fn credential_result(response: ApiResponse, rejected: &str, unreachable: &str) -> ApiResult<Value> {
    if response.success {
        return Ok(response.data.unwrap_or(Value::Null));
    }
    let server_message = response.server_message();
    let failure = response.failure.unwrap_or(Failure::Transport);
    let message = match failure {
        Failure::Status(_) | Failure::Refresh => {
            server_message.unwrap_or_else(|| rejected.to_owned())
        }
        Failure::Transport | Failure::Decode => unreachable.to_owned(),
        Failure::CircuitOpen => response
            .error
            .unwrap_or_else(|| unreachable.to_owned()),
    };
    Err(ApiError::new(failure, message))
}
