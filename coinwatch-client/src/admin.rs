//! Staff-only endpoints.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult, Failure, UPGRADE_FAILED};
use crate::gateway::ApiRequest;

#[derive(Debug, Clone, Serialize)]
pub struct PremiumUpgrade {
    pub email: String,
    pub days: u32,
}

/// Backend acknowledgement of an upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpgradeReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiClient {
    /// Grants `days` of premium to the user with `email`.
    pub async fn upgrade_to_premium(&self, upgrade: &PremiumUpgrade) -> ApiResult<UpgradeReceipt> {
        let body = serde_json::to_value(upgrade)
            .map_err(|error| ApiError::new(Failure::Decode, error.to_string()))?;
        let request = ApiRequest::post(self.routes.premium_upgrade.clone()).with_body(body);
        let response = self.gateway.request(request).await;
        if !response.success {
            let failure = response.failure.unwrap_or(Failure::Transport);
            let message = response.error.unwrap_or_else(|| UPGRADE_FAILED.to_owned());
            return Err(ApiError::new(failure, message));
        }
        info!(days = upgrade.days, "premium upgraded");
        let data = response.data.unwrap_or_default();
        Ok(serde_json::from_value(data).unwrap_or_default())
    }
}
