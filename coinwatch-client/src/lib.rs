//! Client for the Coinwatch backend.
//!
//! [`ApiClient`] wraps a cookie-carrying `reqwest` client in a
//! `reqwest-middleware` stack and routes every call through one [`Gateway`]:
//!
//! - [`CsrfMiddleware`] attaches `X-CSRFToken` to POST/PUT/PATCH/DELETE,
//!   reading the `csrftoken` cookie or asking the CSRF endpoint
//! - a shared [`CircuitBreaker`] refuses calls after repeated failures until a
//!   quiet period has passed
//! - a 401 on the first attempt refreshes the session once and replays the
//!   request once
//!
//! Gateway calls always resolve to an [`ApiResponse`] envelope. The typed
//! endpoint methods (`login`, `latest_prices`, `history`, ...) convert it into
//! [`ApiResult`], and [`AccessControl`] derives login, premium and admin
//! decisions from a single profile fetch.
//!
//! ```no_run
//! use coinwatch_client::{AccessControl, ApiClient, ClientConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(ClientConfig::new("https://api.coinwatch.app"))?;
//! let page = client.latest_prices(1, 25, None).await?;
//! println!("{} coins", page.items.len());
//!
//! let access = AccessControl::new(client.clone());
//! if let Some(target) = access.require_premium_access().await.redirect_to() {
//!     println!("redirect to {target}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod admin;
pub mod auth;
pub mod breaker;
mod client;
pub mod config;
pub mod crypto;
pub mod csrf;
pub mod decode;
pub mod error;
pub mod gateway;
pub mod refresh;
pub mod response;

pub use access::{Access, AccessControl, AdminCheck, AuthState, PremiumCheck, ProfileSource};
pub use admin::{PremiumUpgrade, UpgradeReceipt};
pub use auth::{LoginCredentials, SignupCredentials};
pub use breaker::CircuitBreaker;
pub use client::{ApiClient, ApiClientBuilder};
pub use config::{BASE_URL_ENV, BreakerConfig, ClientConfig, Endpoints};
pub use crypto::{DEFAULT_HISTORY_LIMIT, DEFAULT_INTERVAL, DEFAULT_PAGE_SIZE};
pub use csrf::{CSRF_COOKIE, CSRF_HEADER, CsrfManager, CsrfMiddleware};
pub use error::{ApiError, ApiResult, ClientError, ConfigError, Failure};
pub use gateway::{ApiRequest, Gateway};
pub use refresh::{MAX_REFRESH_RETRIES, RefreshOutcome};
pub use response::ApiResponse;

pub use reqwest::Url;
