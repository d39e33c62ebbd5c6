//! Remote session checks.
//!
//! Every probe is a cold request against the backend: nothing is cached
//! between probes or between requests. A probe that cannot reach the backend
//! reports "no session" instead of failing.

use async_trait::async_trait;
use coinwatch_client::ClientConfig;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::GateError;

/// Questions the gate asks the backend about a visitor's cookies.
#[async_trait]
pub trait SessionProbe: Send + Sync {
    /// The profile endpoint accepts the session.
    async fn has_valid_session(&self, cookies: Option<&str>) -> bool;

    /// The refresh endpoint accepts the session. `None` when it does not.
    async fn refresh_session(&self, cookies: Option<&str>) -> Option<RefreshedSession>;

    /// The profile behind the session has `is_staff: true`.
    async fn is_staff(&self, cookies: Option<&str>) -> bool;
}

/// Cookies rotated by a successful refresh probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshedSession {
    /// Raw `Set-Cookie` header values.
    pub set_cookies: Vec<String>,
}

impl RefreshedSession {
    pub fn new(set_cookies: Vec<String>) -> Self {
        RefreshedSession { set_cookies }
    }

    /// Cookie header for requests made after the refresh.
    ///
    /// Without rotated cookies the original header is returned as-is.
    pub fn apply(&self, cookies: Option<&str>) -> Option<String> {
        if self.set_cookies.is_empty() {
            return cookies.map(str::to_owned);
        }
        merge_cookies(cookies, &self.set_cookies)
    }
}

/// Overlays `Set-Cookie` values on a `Cookie` header.
///
/// Cookies with the same name are replaced in place, new ones are appended.
/// Attributes after the first `;` of a `Set-Cookie` value are ignored.
///
/// ```
/// use coinwatch_tower::probe::merge_cookies;
///
/// let merged = merge_cookies(
///     Some("csrftoken=abc; access=old"),
///     &["access=new; HttpOnly; Path=/".to_owned(), "refresh=r2; HttpOnly".to_owned()],
/// );
/// assert_eq!(merged.as_deref(), Some("csrftoken=abc; access=new; refresh=r2"));
/// ```
pub fn merge_cookies(cookies: Option<&str>, set_cookies: &[String]) -> Option<String> {
    let mut pairs: Vec<(&str, &str)> = cookies
        .into_iter()
        .flat_map(|header| header.split(';'))
        .filter_map(cookie_pair)
        .collect();

    for set_cookie in set_cookies {
        let Some((name, value)) = set_cookie.split(';').next().and_then(cookie_pair) else {
            continue;
        };
        match pairs.iter_mut().find(|(existing, _)| *existing == name) {
            Some(pair) => pair.1 = value,
            None => pairs.push((name, value)),
        }
    }

    if pairs.is_empty() {
        return None;
    }
    let merged: Vec<String> = pairs
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    Some(merged.join("; "))
}

fn cookie_pair(raw: &str) -> Option<(&str, &str)> {
    let (name, value) = raw.trim().split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some((name, value.trim()))
}

/// [`SessionProbe`] backed by the coinwatch API.
///
/// The visitor's `Cookie` header is forwarded verbatim. The probe keeps no
/// cookie store of its own.
#[derive(Debug, Clone)]
pub struct RemoteSessionProbe {
    http: reqwest::Client,
    profile: Url,
    refresh: Url,
}

impl RemoteSessionProbe {
    /// Uses the profile and refresh endpoints of `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, GateError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(RemoteSessionProbe {
            http: builder.build()?,
            profile: config.url(&config.endpoints.profile)?,
            refresh: config.url(&config.endpoints.refresh)?,
        })
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        cookies: Option<&str>,
    ) -> Option<reqwest::Response> {
        let mut request = self
            .http
            .request(method, url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(cookies) = cookies {
            request = request.header(COOKIE, cookies);
        }
        match request.send().await {
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "probe response");
                Some(response)
            }
            Err(error) => {
                debug!(url = %url, error = %error, "probe request failed");
                None
            }
        }
    }
}

#[async_trait]
impl SessionProbe for RemoteSessionProbe {
    async fn has_valid_session(&self, cookies: Option<&str>) -> bool {
        self.send(Method::GET, &self.profile, cookies)
            .await
            .is_some_and(|response| response.status().is_success())
    }

    async fn refresh_session(&self, cookies: Option<&str>) -> Option<RefreshedSession> {
        let response = self.send(Method::POST, &self.refresh, cookies).await?;
        if !response.status().is_success() {
            return None;
        }
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_owned)
            .collect();
        Some(RefreshedSession::new(set_cookies))
    }

    async fn is_staff(&self, cookies: Option<&str>) -> bool {
        let Some(response) = self.send(Method::GET, &self.profile, cookies).await else {
            return false;
        };
        if !response.status().is_success() {
            return false;
        }
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(error) => {
                debug!(error = %error, "failed to read profile body");
                return false;
            }
        };
        let Ok(profile) = serde_json::from_slice::<Value>(&body) else {
            debug!("profile body is not JSON");
            return false;
        };
        let flag = profile
            .get("is_staff")
            .or_else(|| profile.pointer("/user/is_staff"));
        debug!(is_staff = ?flag, "staff probe");
        flag == Some(&Value::Bool(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_without_original_header() {
        let merged = merge_cookies(None, &["access=a1; Path=/".to_owned()]);
        assert_eq!(merged.as_deref(), Some("access=a1"));
    }

    #[test]
    fn merge_skips_malformed_values() {
        let merged = merge_cookies(Some("a=1;  ; =x"), &["garbage".to_owned()]);
        assert_eq!(merged.as_deref(), Some("a=1"));
        assert_eq!(merge_cookies(None, &[]), None);
    }

    #[test]
    fn refresh_without_rotation_reuses_header_verbatim() {
        let session = RefreshedSession::default();
        assert_eq!(session.apply(Some("b=2;a=1")).as_deref(), Some("b=2;a=1"));
        assert_eq!(session.apply(None), None);
    }
}
