//! Session gate for coinwatch pages as Tower middleware.
//!
//! [`RouteGate`] classifies each request path through a [`RouteTable`] and,
//! for gated pages, asks a [`SessionProbe`] about the visitor's cookies before
//! the page renders:
//!
//! | Route | Decision |
//! |-------|----------|
//! | admin (`/admin`) | no session → `/auth`; not staff → `/dashboard`; else allow |
//! | protected (`/dashboard`) | no session → `/auth`; staff → `/admin`; else allow |
//! | auth (`/auth`) | valid or refreshable session → `/dashboard`; else allow |
//! | excluded, unclassified | passed through without probing |
//!
//! A session counts as present when the profile endpoint accepts it or, failing
//! that, the refresh endpoint does. Redirects are `307` responses with a
//! `Location` header. Probe failures never surface as errors: they resolve to
//! a redirect.
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use coinwatch_client::ClientConfig;
//! use coinwatch_tower::RouteGate;
//!
//! # fn app() -> Result<Router, Box<dyn std::error::Error>> {
//! let gate = RouteGate::remote(&ClientConfig::from_env()?)?;
//! let app = Router::new()
//!     .route("/dashboard", get(|| async { "prices" }))
//!     .layer(gate);
//! # Ok(app)
//! # }
//! ```

/// Gate decisions for one request.
pub mod decision;
mod error;
/// Response future of the gate service.
pub mod future;
/// Tower layer and builder.
pub mod layer;
/// Session probes against the backend.
pub mod probe;
/// Path classification.
pub mod routes;
/// The Tower service that applies gate decisions.
pub mod service;

pub use decision::GateDecision;
pub use error::GateError;
pub use layer::{RouteGate, RouteGateBuilder};
pub use probe::{RefreshedSession, RemoteSessionProbe, SessionProbe};
pub use routes::{RouteClass, RouteTable};
pub use service::RouteGateService;
