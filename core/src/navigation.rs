//! Route guard for the dashboard's entry points.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    Register,
    Dashboard,
    Other(String),
}

impl Route {
    pub fn parse(path: &str) -> Self {
        match path.trim_end_matches('/') {
            "" => Route::Home,
            "/login" => Route::Login,
            "/register" => Route::Register,
            p if p == "/dashboard" || p.starts_with("/dashboard/") => Route::Dashboard,
            p => Route::Other(p.to_string()),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Register => "/register",
            Route::Dashboard => "/dashboard",
            Route::Other(path) => path,
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Route::Dashboard)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Where to send a visitor of `route`. `None` means stay.
///
/// Protected routes without a token go to the login page; the login page
/// with a token goes to the dashboard.
pub fn guard(route: &Route, has_token: bool) -> Option<Route> {
    match route {
        r if r.requires_auth() && !has_token => Some(Route::Login),
        Route::Login if has_token => Some(Route::Dashboard),
        _ => None,
    }
}
