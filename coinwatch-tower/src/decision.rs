//! Per-request gate decisions.

use coinwatch_core::RedirectTarget;
use tracing::{debug, info};

use crate::probe::{RefreshedSession, SessionProbe};
use crate::routes::RouteClass;

/// What the gate does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Hand the request to the page.
    Allow,
    /// Answer with a redirect instead of the page.
    Redirect(RedirectTarget),
}

enum Session {
    Valid,
    Refreshed(RefreshedSession),
    Missing,
}

impl Session {
    async fn probe<P: SessionProbe + ?Sized>(probe: &P, cookies: Option<&str>) -> Self {
        let valid = probe.has_valid_session(cookies).await;
        debug!(valid, "session probe");
        if valid {
            return Session::Valid;
        }
        match probe.refresh_session(cookies).await {
            Some(refreshed) => {
                debug!(rotated = refreshed.set_cookies.len(), "refresh probe accepted");
                Session::Refreshed(refreshed)
            }
            None => {
                debug!("refresh probe rejected");
                Session::Missing
            }
        }
    }

    /// Cookies for the staff probe.
    fn cookies(&self, original: Option<&str>) -> Option<String> {
        match self {
            Session::Refreshed(refreshed) => refreshed.apply(original),
            Session::Valid | Session::Missing => original.map(str::to_owned),
        }
    }
}

/// Decides what to do with a request of class `class` carrying `cookies`.
///
/// Gated classes cost at most three probes: session, refresh (only when the
/// session probe fails) and staff. Probe failures count as "no session".
pub async fn decide<P>(probe: &P, class: RouteClass, cookies: Option<&str>) -> GateDecision
where
    P: SessionProbe + ?Sized,
{
    debug!(
        route = class.as_str(),
        has_cookies = cookies.is_some(),
        cookie_len = cookies.map_or(0, str::len),
        "gating request"
    );

    let decision = match class {
        RouteClass::Excluded | RouteClass::Unclassified => GateDecision::Allow,
        RouteClass::Admin => match Session::probe(probe, cookies).await {
            Session::Missing => GateDecision::Redirect(RedirectTarget::Auth),
            session => {
                let cookies = session.cookies(cookies);
                if probe.is_staff(cookies.as_deref()).await {
                    GateDecision::Allow
                } else {
                    GateDecision::Redirect(RedirectTarget::Dashboard)
                }
            }
        },
        RouteClass::Protected => match Session::probe(probe, cookies).await {
            Session::Missing => GateDecision::Redirect(RedirectTarget::Auth),
            session => {
                let cookies = session.cookies(cookies);
                if probe.is_staff(cookies.as_deref()).await {
                    GateDecision::Redirect(RedirectTarget::Admin)
                } else {
                    GateDecision::Allow
                }
            }
        },
        RouteClass::Auth => match Session::probe(probe, cookies).await {
            Session::Missing => GateDecision::Allow,
            Session::Valid | Session::Refreshed(_) => {
                GateDecision::Redirect(RedirectTarget::Dashboard)
            }
        },
    };

    match decision {
        GateDecision::Allow => debug!(route = class.as_str(), "allowing request"),
        GateDecision::Redirect(target) => {
            info!(route = class.as_str(), %target, "redirecting request")
        }
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProbe {
        session: bool,
        refresh: Option<Vec<String>>,
        staff: bool,
        calls: Mutex<Vec<(&'static str, Option<String>)>>,
    }

    impl FakeProbe {
        fn record(&self, probe: &'static str, cookies: Option<&str>) {
            self.calls
                .lock()
                .unwrap()
                .push((probe, cookies.map(str::to_owned)));
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().iter().map(|(name, _)| *name).collect()
        }
    }

    #[async_trait]
    impl SessionProbe for FakeProbe {
        async fn has_valid_session(&self, cookies: Option<&str>) -> bool {
            self.record("session", cookies);
            self.session
        }

        async fn refresh_session(&self, cookies: Option<&str>) -> Option<RefreshedSession> {
            self.record("refresh", cookies);
            self.refresh.clone().map(RefreshedSession::new)
        }

        async fn is_staff(&self, cookies: Option<&str>) -> bool {
            self.record("staff", cookies);
            self.staff
        }
    }

    const COOKIES: Option<&str> = Some("access=a; refresh=r");

    #[tokio::test]
    async fn unclassified_and_excluded_never_probe() {
        let probe = FakeProbe::default();
        assert_eq!(decide(&probe, RouteClass::Unclassified, None).await, GateDecision::Allow);
        assert_eq!(decide(&probe, RouteClass::Excluded, None).await, GateDecision::Allow);
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn admin_without_session_goes_to_auth() {
        let probe = FakeProbe::default();
        let decision = decide(&probe, RouteClass::Admin, COOKIES).await;
        assert_eq!(decision, GateDecision::Redirect(RedirectTarget::Auth));
        assert_eq!(probe.calls(), ["session", "refresh"]);
    }

    #[tokio::test]
    async fn admin_non_staff_goes_to_dashboard() {
        let probe = FakeProbe {
            session: true,
            ..Default::default()
        };
        let decision = decide(&probe, RouteClass::Admin, COOKIES).await;
        assert_eq!(decision, GateDecision::Redirect(RedirectTarget::Dashboard));
        assert_eq!(probe.calls(), ["session", "staff"]);
    }

    #[tokio::test]
    async fn admin_staff_is_allowed_after_refresh() {
        let probe = FakeProbe {
            refresh: Some(vec!["access=rotated; HttpOnly".to_owned()]),
            staff: true,
            ..Default::default()
        };
        let decision = decide(&probe, RouteClass::Admin, COOKIES).await;
        assert_eq!(decision, GateDecision::Allow);

        let calls = probe.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].0, "staff");
        assert_eq!(calls[2].1.as_deref(), Some("access=rotated; refresh=r"));
    }

    #[tokio::test]
    async fn staff_on_dashboard_goes_to_admin() {
        let probe = FakeProbe {
            session: true,
            staff: true,
            ..Default::default()
        };
        let decision = decide(&probe, RouteClass::Protected, COOKIES).await;
        assert_eq!(decision, GateDecision::Redirect(RedirectTarget::Admin));
    }

    #[tokio::test]
    async fn expired_access_with_valid_refresh_reaches_dashboard() {
        let probe = FakeProbe {
            refresh: Some(Vec::new()),
            ..Default::default()
        };
        let decision = decide(&probe, RouteClass::Protected, COOKIES).await;
        assert_eq!(decision, GateDecision::Allow);

        let calls = probe.calls.lock().unwrap();
        assert_eq!(calls[2], ("staff", COOKIES.map(str::to_owned)));
    }

    #[tokio::test]
    async fn protected_without_any_session_goes_to_auth() {
        let probe = FakeProbe::default();
        let decision = decide(&probe, RouteClass::Protected, None).await;
        assert_eq!(decision, GateDecision::Redirect(RedirectTarget::Auth));
    }

    #[tokio::test]
    async fn signed_in_visitors_skip_the_auth_page() {
        let valid = FakeProbe {
            session: true,
            ..Default::default()
        };
        assert_eq!(
            decide(&valid, RouteClass::Auth, COOKIES).await,
            GateDecision::Redirect(RedirectTarget::Dashboard)
        );
        assert_eq!(valid.calls(), ["session"]);

        let refreshable = FakeProbe {
            refresh: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(
            decide(&refreshable, RouteClass::Auth, COOKIES).await,
            GateDecision::Redirect(RedirectTarget::Dashboard)
        );

        let anonymous = FakeProbe::default();
        assert_eq!(decide(&anonymous, RouteClass::Auth, None).await, GateDecision::Allow);
        assert_eq!(anonymous.calls(), ["session", "refresh"]);
    }
}
