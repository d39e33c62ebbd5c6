//! Access-control predicates.
//!
//! Every check fetches the profile once and derives its answer from it.
//! Nothing is cached between checks. The `require_*` checks never navigate;
//! they return an [`Access`] telling the caller where to send a denied user.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coinwatch_core::{PremiumStatus, RedirectTarget, UserProfile};
use tracing::debug;

use crate::client::ApiClient;
use crate::error::{ApiResult, Failure, AUTH_STATE_FAILED};

/// Source of the current user's profile.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self) -> ApiResult<UserProfile>;
}

#[async_trait]
impl ProfileSource for ApiClient {
    async fn fetch_profile(&self) -> ApiResult<UserProfile> {
        self.profile().await
    }
}

#[async_trait]
impl<T> ProfileSource for Arc<T>
where
    T: ProfileSource + ?Sized,
{
    async fn fetch_profile(&self) -> ApiResult<UserProfile> {
        self.as_ref().fetch_profile().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PremiumCheck {
    pub has_premium: bool,
    pub user: Option<UserProfile>,
    pub is_expired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCheck {
    pub is_admin: bool,
    pub user: Option<UserProfile>,
}

/// Result of a `require_*` check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted {
        user: UserProfile,
    },
    Denied {
        redirect_to: RedirectTarget,
        user: Option<UserProfile>,
        is_expired: bool,
    },
}

impl Access {
    pub fn has_access(&self) -> bool {
        matches!(self, Access::Granted { .. })
    }

    pub fn redirect_to(&self) -> Option<RedirectTarget> {
        match self {
            Access::Granted { .. } => None,
            Access::Denied { redirect_to, .. } => Some(*redirect_to),
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Access::Granted { user } => Some(user),
            Access::Denied { user, .. } => user.as_ref(),
        }
    }

    fn unauthenticated() -> Self {
        Access::Denied {
            redirect_to: RedirectTarget::Auth,
            user: None,
            is_expired: false,
        }
    }
}

/// Access checks over a [`ProfileSource`].
#[derive(Debug, Clone)]
pub struct AccessControl<P> {
    source: P,
}

impl<P: ProfileSource> AccessControl<P> {
    pub fn new(source: P) -> Self {
        AccessControl { source }
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    async fn user(&self) -> Option<UserProfile> {
        match self.source.fetch_profile().await {
            Ok(user) => Some(user),
            Err(error) => {
                debug!(%error, "profile unavailable");
                None
            }
        }
    }

    pub async fn is_logged_in(&self) -> bool {
        self.user().await.is_some()
    }

    pub async fn auth_state(&self) -> AuthState {
        match self.source.fetch_profile().await {
            Ok(user) => AuthState {
                is_authenticated: true,
                user: Some(user),
                loading: false,
                error: None,
            },
            Err(error) => {
                let message = match error.failure() {
                    Failure::Decode => AUTH_STATE_FAILED.to_owned(),
                    _ => error.message().to_owned(),
                };
                AuthState {
                    is_authenticated: false,
                    user: None,
                    loading: false,
                    error: Some(message),
                }
            }
        }
    }

    pub async fn check_premium_access(&self) -> PremiumCheck {
        self.check_premium_access_at(Utc::now()).await
    }

    /// Premium check against an explicit clock.
    pub async fn check_premium_access_at(&self, now: DateTime<Utc>) -> PremiumCheck {
        match self.user().await {
            Some(user) => premium_check(user, now),
            None => PremiumCheck {
                has_premium: false,
                user: None,
                is_expired: false,
            },
        }
    }

    pub async fn check_admin_access(&self) -> AdminCheck {
        match self.user().await {
            Some(user) => AdminCheck {
                is_admin: user.is_staff,
                user: Some(user),
            },
            None => AdminCheck {
                is_admin: false,
                user: None,
            },
        }
    }

    pub async fn require_auth(&self) -> Access {
        match self.user().await {
            Some(user) => Access::Granted { user },
            None => Access::unauthenticated(),
        }
    }

    pub async fn require_premium_access(&self) -> Access {
        self.require_premium_access_at(Utc::now()).await
    }

    pub async fn require_premium_access_at(&self, now: DateTime<Utc>) -> Access {
        let Some(user) = self.user().await else {
            return Access::unauthenticated();
        };
        let check = premium_check(user, now);
        match check.user {
            Some(user) if check.has_premium => Access::Granted { user },
            user => Access::Denied {
                redirect_to: RedirectTarget::Dashboard,
                user,
                is_expired: check.is_expired,
            },
        }
    }

    pub async fn require_admin_access(&self) -> Access {
        match self.user().await {
            None => Access::unauthenticated(),
            Some(user) if user.is_staff => Access::Granted { user },
            Some(user) => Access::Denied {
                redirect_to: RedirectTarget::Dashboard,
                user: Some(user),
                is_expired: false,
            },
        }
    }
}

fn premium_check(user: UserProfile, now: DateTime<Utc>) -> PremiumCheck {
    let status = user.premium_status_at(now);
    PremiumCheck {
        has_premium: status.is_active(),
        is_expired: matches!(status, PremiumStatus::Expired { .. }),
        user: Some(user),
    }
}
