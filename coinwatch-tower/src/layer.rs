use std::sync::Arc;

use coinwatch_client::ClientConfig;
use tower::Layer;

use crate::error::GateError;
use crate::probe::RemoteSessionProbe;
use crate::routes::RouteTable;
use crate::service::RouteGateService;

/// Tower layer that gates page requests on the visitor's session.
#[derive(Debug)]
pub struct RouteGate<P> {
    probe: Arc<P>,
    routes: Arc<RouteTable>,
}

impl<P> Clone for RouteGate<P> {
    fn clone(&self) -> Self {
        RouteGate {
            probe: Arc::clone(&self.probe),
            routes: Arc::clone(&self.routes),
        }
    }
}

impl<P> RouteGate<P> {
    /// Gate with the default [`RouteTable`].
    pub fn new(probe: P) -> Self {
        Self::builder(probe).build()
    }

    pub fn builder(probe: P) -> RouteGateBuilder<P> {
        RouteGateBuilder {
            probe,
            routes: RouteTable::default(),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

impl RouteGate<RemoteSessionProbe> {
    /// Gate probing the backend described by `config`.
    pub fn remote(config: &ClientConfig) -> Result<Self, GateError> {
        Ok(Self::new(RemoteSessionProbe::new(config)?))
    }
}

impl<S, P> Layer<S> for RouteGate<P> {
    type Service = RouteGateService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        RouteGateService::new(inner, Arc::clone(&self.probe), Arc::clone(&self.routes))
    }
}

pub struct RouteGateBuilder<P> {
    probe: P,
    routes: RouteTable,
}

impl<P> RouteGateBuilder<P> {
    /// Replaces the whole route table.
    pub fn routes(self, routes: RouteTable) -> Self {
        RouteGateBuilder { routes, ..self }
    }

    pub fn protect(mut self, prefix: impl Into<String>) -> Self {
        self.routes.protected.push(prefix.into());
        self
    }

    pub fn admin(mut self, prefix: impl Into<String>) -> Self {
        self.routes.admin.push(prefix.into());
        self
    }

    pub fn auth(mut self, prefix: impl Into<String>) -> Self {
        self.routes.auth.push(prefix.into());
        self
    }

    pub fn exclude(mut self, prefix: impl Into<String>) -> Self {
        self.routes.excluded.push(prefix.into());
        self
    }

    pub fn build(self) -> RouteGate<P> {
        RouteGate {
            probe: Arc::new(self.probe),
            routes: Arc::new(self.routes),
        }
    }
}
