use serde::{Deserialize, Serialize};

use crate::error::GateError;

/// How the gate treats a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Assets and API routes the gate never looks at.
    Excluded,
    /// Staff-only pages.
    Admin,
    /// Pages that need a signed-in user.
    Protected,
    /// Login and signup pages.
    Auth,
    /// Everything else. Passed through unchanged.
    Unclassified,
}

impl RouteClass {
    /// Whether requests of this class are probed before reaching the page.
    pub fn is_gated(self) -> bool {
        matches!(
            self,
            RouteClass::Admin | RouteClass::Protected | RouteClass::Auth
        )
    }

    /// Short label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            RouteClass::Excluded => "excluded",
            RouteClass::Admin => "admin",
            RouteClass::Protected => "protected",
            RouteClass::Auth => "auth",
            RouteClass::Unclassified => "unclassified",
        }
    }
}

/// Path prefixes for each gated class.
///
/// Matching is a plain prefix test on the request path. A path is checked
/// against `excluded` first, then `admin`, `protected` and `auth`.
///
/// ```yaml
/// protected: [/dashboard, /advisor]
/// admin: [/admin]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTable {
    pub excluded: Vec<String>,
    pub admin: Vec<String>,
    pub protected: Vec<String>,
    pub auth: Vec<String>,
}

impl Default for RouteTable {
    fn default() -> Self {
        RouteTable {
            excluded: to_owned(&[
                "/api",
                "/_next/static",
                "/_next/image",
                "/favicon.ico",
                "/public",
            ]),
            admin: to_owned(&["/admin"]),
            protected: to_owned(&["/dashboard"]),
            auth: to_owned(&["/auth"]),
        }
    }
}

impl RouteTable {
    /// Parses a YAML table. Omitted lists keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, GateError> {
        serde_saphyr::from_str(yaml).map_err(|error| GateError::Routes(error.to_string()))
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        let matches = |prefixes: &[String]| prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()));
        if matches(&self.excluded) {
            RouteClass::Excluded
        } else if matches(&self.admin) {
            RouteClass::Admin
        } else if matches(&self.protected) {
            RouteClass::Protected
        } else if matches(&self.auth) {
            RouteClass::Auth
        } else {
            RouteClass::Unclassified
        }
    }
}

fn to_owned(prefixes: &[&str]) -> Vec<String> {
    prefixes.iter().map(|prefix| (*prefix).to_owned()).collect()
}
