use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use http::header::COOKIE;
use http::{HeaderMap, Request, Response};
use tower::Service;
use tracing::{Instrument, debug, info_span};

use crate::decision::decide;
use crate::future::RouteGateFuture;
use crate::probe::SessionProbe;
use crate::routes::RouteTable;

pub struct RouteGateService<S, P> {
    inner: S,
    probe: Arc<P>,
    routes: Arc<RouteTable>,
}

impl<S, P> RouteGateService<S, P> {
    pub fn new(inner: S, probe: Arc<P>, routes: Arc<RouteTable>) -> Self {
        RouteGateService {
            inner,
            probe,
            routes,
        }
    }
}

impl<S, P> Clone for RouteGateService<S, P>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        RouteGateService {
            inner: self.inner.clone(),
            probe: Arc::clone(&self.probe),
            routes: Arc::clone(&self.routes),
        }
    }
}

impl<S, P, ReqBody, ResBody> Service<Request<ReqBody>> for RouteGateService<S, P>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone,
    P: SessionProbe + 'static,
    ResBody: Default,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = RouteGateFuture<S, ReqBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let path = request.uri().path().to_owned();
        let class = self.routes.classify(&path);
        if !class.is_gated() {
            debug!(%path, route = class.as_str(), "passing request through");
            return RouteGateFuture::passthrough(self.inner.call(request));
        }

        // The ready service takes this request; the clone waits for the next poll_ready.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        let cookies = cookie_header(request.headers());
        let probe = Arc::clone(&self.probe);
        let span = info_span!("route_gate", %path, route = class.as_str());
        let decision = async move { decide(probe.as_ref(), class, cookies.as_deref()).await }
            .instrument(span)
            .boxed();

        RouteGateFuture::deciding(decision, inner, request)
    }
}

/// All `Cookie` headers of a request joined into one value.
fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    (!values.is_empty()).then(|| values.join("; "))
}
