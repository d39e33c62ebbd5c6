use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use coinwatch_core::RedirectTarget;
use futures::future::BoxFuture;
use futures::ready;
use http::header::LOCATION;
use http::{HeaderValue, Request, Response, StatusCode};
use pin_project::pin_project;
use tower::Service;

use crate::decision::GateDecision;

/// Response future of [`RouteGateService`](crate::service::RouteGateService).
///
/// Gated requests first wait for the probe decision, then either call the
/// wrapped service or answer with a redirect.
#[pin_project]
pub struct RouteGateFuture<S, B>
where
    S: Service<Request<B>>,
{
    #[pin]
    state: State<S, B>,
}

#[pin_project(project = StateProj)]
enum State<S, B>
where
    S: Service<Request<B>>,
{
    Deciding {
        decision: BoxFuture<'static, GateDecision>,
        pending: Option<(S, Request<B>)>,
    },
    Calling {
        #[pin]
        future: S::Future,
    },
}

impl<S, B> RouteGateFuture<S, B>
where
    S: Service<Request<B>>,
{
    pub(crate) fn passthrough(future: S::Future) -> Self {
        RouteGateFuture {
            state: State::Calling { future },
        }
    }

    pub(crate) fn deciding(
        decision: BoxFuture<'static, GateDecision>,
        service: S,
        request: Request<B>,
    ) -> Self {
        RouteGateFuture {
            state: State::Deciding {
                decision,
                pending: Some((service, request)),
            },
        }
    }
}

impl<S, B, ResBody> Future for RouteGateFuture<S, B>
where
    S: Service<Request<B>, Response = Response<ResBody>>,
    ResBody: Default,
{
    type Output = Result<Response<ResBody>, S::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            match this.state.as_mut().project() {
                StateProj::Deciding { decision, pending } => {
                    match ready!(decision.as_mut().poll(cx)) {
                        GateDecision::Redirect(target) => {
                            return Poll::Ready(Ok(redirect(target)));
                        }
                        GateDecision::Allow => {
                            let (mut service, request) = pending
                                .take()
                                .expect("RouteGateFuture polled after completion");
                            let future = service.call(request);
                            this.state.set(State::Calling { future });
                        }
                    }
                }
                StateProj::Calling { future } => return future.poll(cx),
            }
        }
    }
}

/// `307 Temporary Redirect` to `target` with an empty body.
pub fn redirect<B: Default>(target: RedirectTarget) -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
    response
        .headers_mut()
        .insert(LOCATION, HeaderValue::from_static(target.path()));
    response
}
