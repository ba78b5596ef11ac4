//! Drives a [`ShellGuard`] against real storage and a real API.
//!
//! Single-threaded: fetches are futures in a [`FuturesUnordered`] polled from
//! the same loop that reads commands, so the guard is never shared. Views go
//! out through a `watch` channel; only the latest one matters.

use std::str::FromStr;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::StreamExt;
use futures_util::future::LocalBoxFuture;
use futures_util::stream::FuturesUnordered;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use shared::access::{
    AccessControl, ClaimDecoder, RawToken, SubscriptionState, TokenStore, unix_now,
};
use shared::types::{AppConfig, AuthResponse};

use crate::api::SessionApi;
use crate::machine::{FetchFailure, NavigationId, ShellEffect, ShellEvent, ShellGuard, View};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ShellCommand {
    Navigate(String),
    Retry,
    /// The auth API's login / OTP answer. Without `redirect`, the
    /// `?redirect=` of the page being shown is used.
    SignIn {
        response: AuthResponse,
        redirect: Option<String>,
    },
    SignOut,
}

impl FromStr for ShellCommand {
    type Err = String;

    /// `go <path>`, `retry`, `signin <token | json> [redirect]`, `signout`.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match verb {
            "go" if !rest.is_empty() => Ok(ShellCommand::Navigate(rest.to_string())),
            "retry" => Ok(ShellCommand::Retry),
            "signout" => Ok(ShellCommand::SignOut),
            "signin" if rest.starts_with('{') => {
                let response: AuthResponse =
                    serde_json::from_str(rest).map_err(|e| format!("bad auth response: {}", e))?;
                Ok(ShellCommand::SignIn {
                    response,
                    redirect: None,
                })
            }
            "signin" if !rest.is_empty() => {
                let mut parts = rest.split_whitespace();
                let token = parts.next().unwrap_or_default().to_string();
                Ok(ShellCommand::SignIn {
                    response: AuthResponse {
                        token,
                        message: String::new(),
                    },
                    redirect: parts.next().map(str::to_string),
                })
            }
            _ => Err(format!("unknown command: {:?}", line)),
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Lifetime given to tokens written at sign-in.
    pub token_ttl: Duration,
    pub max_redirects: usize,
    pub poll_interval: Duration,
    /// Cached subscription status older than this is re-fetched on the next
    /// gated navigation.
    pub subscription_ttl: Duration,
}

impl RuntimeOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            token_ttl: Duration::from_secs(config.auth.token_ttl_secs),
            max_redirects: config.shell.max_redirects,
            poll_interval: Duration::from_millis(config.api.poll_interval_ms),
            subscription_ttl: Duration::from_secs(config.api.subscription_ttl_secs),
        }
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(604_800),
            max_redirects: 8,
            poll_interval: Duration::from_millis(3000),
            subscription_ttl: Duration::from_secs(300),
        }
    }
}

// ---------------------------------------------------------------------------
// ShellRuntime
// ---------------------------------------------------------------------------

enum Input {
    Command(ShellCommand),
    Event(ShellEvent),
}

pub struct ShellRuntime<S, A> {
    guard: ShellGuard,
    decoder: ClaimDecoder,
    store: S,
    api: A,
    options: RuntimeOptions,

    /// Token read for the current navigation.
    token: Option<RawToken>,
    /// Redirects since the last user-initiated navigation.
    hops: usize,
    /// When the cached subscription status was last fetched successfully.
    subscription_checked: Option<Instant>,
    views: watch::Sender<View>,
    pending: FuturesUnordered<LocalBoxFuture<'static, ShellEvent>>,
}

impl<S, A> ShellRuntime<S, A>
where
    S: TokenStore,
    A: SessionApi + Clone + 'static,
{
    pub fn new(access: AccessControl, store: S, api: A, options: RuntimeOptions) -> Self {
        let AccessControl {
            decoder,
            classifier,
            policy,
        } = access;
        let (views, _) = watch::channel(View::Loader);

        Self {
            guard: ShellGuard::new(classifier, policy, options.poll_interval),
            decoder,
            store,
            api,
            options,
            token: None,
            hops: 0,
            subscription_checked: None,
            views,
            pending: FuturesUnordered::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.views.subscribe()
    }

    pub fn view(&self) -> View {
        self.views.borrow().clone()
    }

    pub fn guard(&self) -> &ShellGuard {
        &self.guard
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Heal the two token locations. Run once, before the first navigation.
    pub fn start(&self) {
        match self.store.reconcile() {
            Ok(outcome) => debug!("Token storage on start: {:?}", outcome),
            Err(e) => error!("Token storage could not be reconciled: {}", e),
        }
    }

    /// A user-initiated navigation.
    pub fn navigate(&mut self, path: impl Into<String>) {
        self.hops = 0;
        self.visit(path.into());
    }

    pub fn execute(&mut self, command: ShellCommand) {
        match command {
            ShellCommand::Navigate(path) => self.navigate(path),
            ShellCommand::Retry => self.dispatch(ShellEvent::RetrySubscription),
            ShellCommand::SignIn { response, redirect } => self.sign_in(response, redirect),
            ShellCommand::SignOut => {
                if let Err(e) = self.store.clear() {
                    error!("Failed to clear session: {}", e);
                }
                info!("Signed out");
                let login = self.guard.login_path().to_string();
                self.navigate(login);
            }
        }
    }

    pub fn dispatch(&mut self, event: ShellEvent) {
        if matches!(event, ShellEvent::SubscriptionResolved { result: Ok(_), .. }) {
            self.subscription_checked = Some(Instant::now());
        }
        let effects = self.guard.handle(event);
        if let Some(next) = self.apply(effects) {
            self.visit(next);
        }
    }

    /// Feed every outstanding fetch back into the guard until none remain.
    /// Does not return while a subscription poll keeps rescheduling itself.
    pub async fn settle(&mut self) {
        while let Some(event) = self.pending.next().await {
            self.dispatch(event);
        }
    }

    /// Process commands and fetch results until the command channel closes.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<ShellCommand>) {
        loop {
            let input = tokio::select! {
                command = commands.recv() => match command {
                    Some(c) => Input::Command(c),
                    None => break,
                },
                Some(event) = self.pending.next(), if !self.pending.is_empty() => Input::Event(event),
            };

            match input {
                Input::Command(c) => self.execute(c),
                Input::Event(e) => self.dispatch(e),
            }
        }
        debug!("Command channel closed, shell stopping");
    }

    // -- internals ----------------------------------------------------------

    fn sign_in(&mut self, response: AuthResponse, redirect: Option<String>) {
        if response.token.is_empty() {
            warn!("Sign-in response carried no token");
            return;
        }
        let token = RawToken::new(response.token);
        if let Err(e) = self.store.write(&token, self.options.token_ttl) {
            error!("Failed to store session: {}", e);
            return;
        }
        if !response.message.is_empty() {
            info!("{}", response.message);
        }

        let target = redirect
            .or_else(|| redirect_param(self.guard.path()))
            .filter(|t| is_local_path(t))
            .unwrap_or_else(|| self.guard.login_path().to_string());
        self.navigate(target);
    }

    fn visit(&mut self, mut path: String) {
        loop {
            // Anything in flight belongs to the navigation being left.
            self.pending = FuturesUnordered::new();

            if self
                .subscription_checked
                .is_some_and(|at| at.elapsed() >= self.options.subscription_ttl)
            {
                self.subscription_checked = None;
                self.guard.handle(ShellEvent::SubscriptionStale);
            }

            let effects = self.guard.handle(ShellEvent::Navigated { path });
            self.apply(effects);

            let raw = self.store.read().unwrap_or_else(|e| {
                error!("Failed to read session token: {}", e);
                None
            });
            let state = self
                .decoder
                .evaluate(raw.as_ref().map(RawToken::as_str), unix_now());
            self.token = raw;

            let effects = self.guard.handle(ShellEvent::TokenRead(state));
            match self.apply(effects) {
                Some(next) => path = next,
                None => return,
            }
        }
    }

    /// Perform `effects`; returns the next path when one of them redirects.
    fn apply(&mut self, effects: Vec<ShellEffect>) -> Option<String> {
        let mut next = None;
        for effect in effects {
            match effect {
                ShellEffect::ClearToken => {
                    self.token = None;
                    if let Err(e) = self.store.clear() {
                        error!("Failed to clear session token: {}", e);
                    }
                }
                ShellEffect::FetchSubscription { nav, delay } => {
                    let fetch = self.fetch_subscription(nav, delay);
                    self.pending.push(fetch);
                }
                ShellEffect::FetchProfile { nav } => {
                    let fetch = self.fetch_profile(nav);
                    self.pending.push(fetch);
                }
                ShellEffect::Navigate { to } => {
                    self.hops += 1;
                    if self.hops > self.options.max_redirects {
                        error!("Redirect limit reached at {}", to);
                        self.views.send_replace(View::Halted {
                            message: format!(
                                "Too many redirects (last target {}). Please sign in again.",
                                to
                            ),
                        });
                        return None;
                    }
                    next = Some(to);
                }
                ShellEffect::Render(view) => {
                    self.views.send_replace(view);
                }
            }
        }
        next
    }

    fn fetch_subscription(
        &self,
        nav: NavigationId,
        delay: Duration,
    ) -> LocalBoxFuture<'static, ShellEvent> {
        let api = self.api.clone();
        let token = self.token.clone();
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = match token {
                Some(token) => api
                    .subscription_status(&token)
                    .await
                    .map(|r| SubscriptionState::from(&r))
                    .map_err(FetchFailure::from),
                None => Err(FetchFailure::Unauthorized),
            };
            ShellEvent::SubscriptionResolved { nav, result }
        }
        .boxed_local()
    }

    fn fetch_profile(&self, nav: NavigationId) -> LocalBoxFuture<'static, ShellEvent> {
        let api = self.api.clone();
        let token = self.token.clone();
        async move {
            let photo = match token {
                Some(token) => api
                    .admin_profile(&token)
                    .await
                    .map(|r| r.photo())
                    .map_err(FetchFailure::from),
                None => Err(FetchFailure::Unauthorized),
            };
            ShellEvent::ProfileResolved { nav, photo }
        }
        .boxed_local()
    }
}

/// Decoded `redirect` query parameter of `path`, if any.
fn redirect_param(path: &str) -> Option<String> {
    let (_, query) = path.split_once('?')?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "redirect")
        .map(|(_, v)| v.into_owned())
}

/// Same-origin absolute path.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}
