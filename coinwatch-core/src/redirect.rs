//! Redirect targets produced by access checks and the route gate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a denied visitor is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectTarget {
    /// Login / signup page.
    Auth,
    /// Regular user dashboard.
    Dashboard,
    /// Staff dashboard.
    Admin,
}

impl RedirectTarget {
    /// Absolute path of the target page.
    pub fn path(&self) -> &'static str {
        match self {
            RedirectTarget::Auth => "/auth",
            RedirectTarget::Dashboard => "/dashboard",
            RedirectTarget::Admin => "/admin",
        }
    }
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
