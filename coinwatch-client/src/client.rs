use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest_middleware::ClientBuilder;

use crate::breaker::CircuitBreaker;
use crate::config::{ClientConfig, Routes};
use crate::csrf::{CsrfManager, CsrfMiddleware};
use crate::error::ClientError;
use crate::gateway::Gateway;

/// Typed client for the Coinwatch backend.
///
/// Cloning is cheap; clones share the cookie jar, the CSRF manager and the
/// circuit breaker.
#[derive(Clone, Debug)]
pub struct ApiClient {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) routes: Arc<Routes>,
    pub(crate) gateway: Gateway,
    jar: Arc<Jar>,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Self::builder(config).build()
    }

    /// Client for the backend named by `NEXT_PUBLIC_API_BASE_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            breaker: None,
            jar: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        self.gateway.breaker()
    }

    pub fn csrf(&self) -> &CsrfManager {
        self.gateway.csrf()
    }

    /// The session cookie jar.
    pub fn cookies(&self) -> &Arc<Jar> {
        &self.jar
    }
}

pub struct ApiClientBuilder {
    config: ClientConfig,
    breaker: Option<CircuitBreaker>,
    jar: Option<Arc<Jar>>,
}

impl ApiClientBuilder {
    /// Shares an existing breaker instead of creating one from the config.
    pub fn breaker(self, breaker: CircuitBreaker) -> Self {
        ApiClientBuilder {
            breaker: Some(breaker),
            ..self
        }
    }

    /// Uses an existing cookie jar, e.g. one seeded with session cookies.
    pub fn cookie_jar(self, jar: Arc<Jar>) -> Self {
        ApiClientBuilder {
            jar: Some(jar),
            ..self
        }
    }

    pub fn build(self) -> Result<ApiClient, ClientError> {
        let routes = Routes::resolve(&self.config)?;
        let origin = self.config.url("/")?;
        let jar = self.jar.unwrap_or_default();

        let mut inner = reqwest::Client::builder().cookie_provider(Arc::clone(&jar));
        if let Some(timeout) = self.config.timeout {
            inner = inner.timeout(timeout);
        }
        let inner = inner.build()?;

        let csrf = CsrfManager::new(inner.clone(), Arc::clone(&jar), origin, routes.csrf.clone());
        let http = ClientBuilder::new(inner)
            .with(CsrfMiddleware::new(csrf.clone()))
            .build();
        let breaker = self
            .breaker
            .unwrap_or_else(|| CircuitBreaker::new(self.config.breaker));
        let gateway = Gateway::new(http, csrf, breaker, routes.refresh.clone());

        Ok(ApiClient {
            config: Arc::new(self.config),
            routes: Arc::new(routes),
            gateway,
            jar,
        })
    }
}
