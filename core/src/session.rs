//! Authentication state shared with the view layer.
//!
//! # Design
//! The session is held in a `tokio::sync::watch` channel: the store is the
//! only writer, and views either snapshot it or `subscribe` for changes.
//!
//! ```text
//! Uninitialized -> Loading -> Authenticated | Anonymous
//! Authenticated -> Anonymous       (logout, or a 401 anywhere)
//! Anonymous     -> Authenticated   (login only)
//! ```
//!
//! A 401 reaches the session through the hook registered on `ApiClient`, so
//! expiry is handled in one place no matter which call observed it.

use std::sync::Arc;

use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::navigation::{self, Route};
use crate::transport::Transport;
use crate::types::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Uninitialized,
    Loading,
    Authenticated,
    Anonymous,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<User>,
    pub status: SessionStatus,
    /// Set when the session ended because the backend rejected the token;
    /// the view navigates there and clears it with `take_redirect`.
    pub redirect: Option<Route>,
}

impl Session {
    fn sign_in(&mut self, token: String, user: User) {
        self.token = Some(token);
        self.user = Some(user);
        self.status = SessionStatus::Authenticated;
        self.redirect = None;
    }

    fn sign_out(&mut self) {
        self.token = None;
        self.user = None;
        self.status = SessionStatus::Anonymous;
    }
}

pub struct SessionStore<T> {
    api: Arc<ApiClient<T>>,
    state: Arc<watch::Sender<Session>>,
    init: OnceCell<SessionStatus>,
}

impl<T: Transport> SessionStore<T> {
    /// Create the store and register it as the client's 401 handler.
    pub fn new(api: Arc<ApiClient<T>>) -> Self {
        let (state, _) = watch::channel(Session::default());
        let state = Arc::new(state);

        let expired = Arc::downgrade(&state);
        api.on_unauthorized(move || {
            if let Some(state) = expired.upgrade() {
                state.send_modify(|session| {
                    session.sign_out();
                    session.redirect = Some(Route::Login);
                });
            }
        });

        Self {
            api,
            state,
            init: OnceCell::new(),
        }
    }

    pub fn api(&self) -> &Arc<ApiClient<T>> {
        &self.api
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn take_redirect(&self) -> Option<Route> {
        let mut redirect = None;
        self.state.send_if_modified(|session| {
            redirect = session.redirect.take();
            redirect.is_some()
        });
        redirect
    }

    /// Where a visitor of `route` should be sent given the current token.
    pub fn guard(&self, route: &Route) -> Option<Route> {
        navigation::guard(route, self.api.token().is_some())
    }

    /// Settle the session from the persisted token.
    ///
    /// Runs once: concurrent and later callers wait for, and observe, the
    /// first call's outcome. An invalid or unreadable token downgrades the
    /// session to anonymous rather than failing.
    pub async fn initialize(&self) -> SessionStatus {
        *self.init.get_or_init(|| self.settle()).await
    }

    async fn settle(&self) -> SessionStatus {
        let current = self.status();
        if current != SessionStatus::Uninitialized {
            return current;
        }
        self.state.send_modify(|session| session.status = SessionStatus::Loading);

        let token = match self.api.restore_credentials() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("no persisted token");
                return self.settle_anonymous();
            }
            Err(e) => {
                warn!(error = %e, "could not read persisted token");
                self.api.clear_credentials();
                return self.settle_anonymous();
            }
        };

        match self.api.current_user().await {
            Ok(user) => {
                info!(user = %user.email, "session restored");
                self.state.send_modify(|session| session.sign_in(token, user));
                SessionStatus::Authenticated
            }
            Err(e) => {
                warn!(error = %e, "persisted token rejected");
                self.api.clear_credentials();
                self.settle_anonymous()
            }
        }
    }

    fn settle_anonymous(&self) -> SessionStatus {
        self.state.send_modify(Session::sign_out);
        SessionStatus::Anonymous
    }

    /// On failure the session is left as it was and the error is returned.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let outcome = self.api.login(email, password).await?;
        info!(user = %outcome.user.email, "logged in");
        let user = outcome.user.clone();
        self.state
            .send_modify(|session| session.sign_in(outcome.token, outcome.user));
        Ok(user)
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, email: &str, password: &str, full_name: &str) -> Result<User, ApiError> {
        self.api.register(email, password, full_name).await
    }

    /// Clear the session locally, then invalidate the token server-side in
    /// the background. Must be called within a tokio runtime.
    ///
    /// The returned handle completes when the server call has finished; its
    /// outcome is only logged.
    pub fn logout(&self) -> JoinHandle<()> {
        let token = self.api.token();
        self.api.clear_credentials();
        self.state.send_modify(Session::sign_out);
        info!("logged out");

        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            let Some(token) = token else {
                return;
            };
            if let Err(e) = api.logout(&token).await {
                warn!(error = %e, "server-side logout failed");
            }
        })
    }
}
