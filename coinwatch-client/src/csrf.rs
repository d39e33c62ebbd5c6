//! CSRF token handling.
//!
//! The backend issues a readable `csrftoken` cookie and expects its value
//! echoed in the `X-CSRFToken` header on state-changing requests.
//! [`CsrfManager`] reads the token from the shared cookie jar, falling back to
//! the CSRF endpoint, and [`CsrfMiddleware`] attaches it to outgoing
//! POST/PUT/PATCH/DELETE requests.

use std::sync::Arc;

use async_trait::async_trait;
use http::{Extensions, HeaderName, HeaderValue, Method};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Request, Response, Url};
use reqwest_middleware::{Middleware, Next};
use serde_json::Value;
use tracing::debug;

/// Cookie holding the CSRF token.
pub const CSRF_COOKIE: &str = "csrftoken";

/// Header carrying the CSRF token.
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrftoken");

/// Returns `true` for methods that must carry a CSRF token.
pub fn is_unsafe(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Reads and fetches CSRF tokens.
#[derive(Clone)]
pub struct CsrfManager {
    client: reqwest::Client,
    jar: Arc<Jar>,
    origin: Url,
    endpoint: Url,
}

impl std::fmt::Debug for CsrfManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfManager")
            .field("origin", &self.origin.as_str())
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl CsrfManager {
    /// `client` must be built with `jar` as its cookie provider so that
    /// cookies set by the CSRF endpoint land in the jar.
    pub fn new(client: reqwest::Client, jar: Arc<Jar>, origin: Url, endpoint: Url) -> Self {
        CsrfManager {
            client,
            jar,
            origin,
            endpoint,
        }
    }

    /// The `csrftoken` cookie value for the backend origin, or an empty
    /// string.
    pub fn token_from_cookie(&self) -> String {
        let Some(header) = self.jar.cookies(&self.origin) else {
            return String::new();
        };
        let Ok(cookies) = header.to_str() else {
            return String::new();
        };
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == CSRF_COOKIE)
            .map(|(_, value)| value.to_owned())
            .unwrap_or_default()
    }

    /// Asks the CSRF endpoint for a token.
    ///
    /// A JSON body yields its `csrfToken` field (empty when missing). A body
    /// that is not JSON falls back to the cookie. Network failure yields an
    /// empty string.
    pub async fn ensure_csrf(&self) -> String {
        let response = match self.client.get(self.endpoint.clone()).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(%error, "csrf endpoint unreachable");
                return String::new();
            }
        };
        let text = match response.text().await {
            Ok(text) => text,
            Err(error) => {
                debug!(%error, "csrf response body unreadable");
                return String::new();
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => body
                .get("csrfToken")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            Err(_) => {
                debug!("csrf endpoint returned a non-JSON body, reading cookie");
                self.token_from_cookie()
            }
        }
    }

    /// Cookie first, then the endpoint.
    pub async fn resolve(&self) -> String {
        let token = self.token_from_cookie();
        if !token.is_empty() {
            return token;
        }
        self.ensure_csrf().await
    }
}

/// Attaches `X-CSRFToken` to unsafe requests that don't already carry it.
#[derive(Clone, Debug)]
pub struct CsrfMiddleware {
    manager: CsrfManager,
}

impl CsrfMiddleware {
    pub fn new(manager: CsrfManager) -> Self {
        CsrfMiddleware { manager }
    }
}

#[async_trait]
impl Middleware for CsrfMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        if is_unsafe(req.method()) && !req.headers().contains_key(CSRF_HEADER) {
            let token = self.manager.resolve().await;
            match HeaderValue::from_str(&token) {
                Ok(value) if !token.is_empty() => {
                    req.headers_mut().insert(CSRF_HEADER, value);
                }
                _ => debug!(method = %req.method(), "sending unsafe request without csrf token"),
            }
        }
        next.run(req, extensions).await
    }
}
