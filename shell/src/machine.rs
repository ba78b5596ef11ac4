//! The client-side access guard as a pure state machine.
//!
//! [`ShellGuard::handle`] takes one [`ShellEvent`] and returns the
//! [`ShellEffect`]s the runtime must perform. Nothing in here touches storage,
//! the network, or a clock, so every transition is testable in isolation.
//!
//! Each navigation gets a fresh [`NavigationId`]. Fetch results carry the id
//! they were issued under and are dropped when it is no longer current, which
//! is how an in-flight check is cancelled by navigating away.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use shared::access::{
    AccessPolicy, AccessRequest, Chrome, Decision, RouteClass, RouteClassifier, SubscriptionGate,
    SubscriptionState, TokenState,
};
use shared::types::Role;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NavigationId(u64);

impl NavigationId {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    DecodingToken,
    FetchingSubscription,
    Deciding,
    Allowed,
    /// The subscription check failed; the user can retry.
    SubscriptionUnavailable,
    /// Terminal for the current navigation.
    Redirecting { target: String },
}

/// What the shell shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Loader,
    Page {
        path: String,
        /// Header and sidebar; only on protected pages.
        chrome: Option<Chrome>,
    },
    Unavailable { message: String },
    /// Redirects went in circles; nothing further is attempted.
    Halted { message: String },
}

/// A collaborator call that did not produce data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The API refused the token; the session is over.
    #[error("session rejected by the API")]
    Unauthorized,

    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Navigated {
        path: String,
    },
    TokenRead(TokenState),
    SubscriptionResolved {
        nav: NavigationId,
        result: Result<SubscriptionState, FetchFailure>,
    },
    ProfileResolved {
        nav: NavigationId,
        photo: Result<Option<String>, FetchFailure>,
    },
    RetrySubscription,
    /// The cached subscription is old enough to be re-checked.
    SubscriptionStale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEffect {
    ClearToken,
    FetchSubscription { nav: NavigationId, delay: Duration },
    FetchProfile { nav: NavigationId },
    Navigate { to: String },
    Render(View),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SubscriptionCache {
    Unknown,
    Loading(NavigationId),
    Failed(NavigationId, String),
    /// Served while `stale`; the next gated navigation re-fetches in the
    /// background.
    Ready {
        state: SubscriptionState,
        stale: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProfileCache {
    Unknown,
    Loading(NavigationId),
    Known(Option<String>),
}

// ---------------------------------------------------------------------------
// ShellGuard
// ---------------------------------------------------------------------------

pub struct ShellGuard {
    classifier: RouteClassifier,
    policy: AccessPolicy,
    poll_interval: Duration,

    phase: Phase,
    nav: NavigationId,
    path: String,
    token: TokenState,

    /// `(user_id, role)` the caches below belong to.
    session: Option<(String, Role)>,
    subscription: SubscriptionCache,
    profile: ProfileCache,
    polling: bool,
}

impl ShellGuard {
    pub fn new(classifier: RouteClassifier, policy: AccessPolicy, poll_interval: Duration) -> Self {
        Self {
            classifier,
            policy,
            poll_interval,
            phase: Phase::Initializing,
            nav: NavigationId::default(),
            path: String::new(),
            token: TokenState::Missing,
            session: None,
            subscription: SubscriptionCache::Unknown,
            profile: ProfileCache::Unknown,
            polling: false,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn navigation(&self) -> NavigationId {
        self.nav
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn login_path(&self) -> &str {
        &self.policy.destinations().login
    }

    pub fn handle(&mut self, event: ShellEvent) -> Vec<ShellEffect> {
        match event {
            ShellEvent::Navigated { path } => self.on_navigated(path),
            ShellEvent::TokenRead(token) => self.on_token(token),
            ShellEvent::SubscriptionResolved { nav, result } => self.on_subscription(nav, result),
            ShellEvent::ProfileResolved { nav, photo } => self.on_profile(nav, photo),
            ShellEvent::RetrySubscription => self.on_retry(),
            ShellEvent::SubscriptionStale => self.on_stale(),
        }
    }

    // -- event handlers -----------------------------------------------------

    fn on_navigated(&mut self, path: String) -> Vec<ShellEffect> {
        self.nav = self.nav.next();
        self.path = path;
        self.polling = false;
        self.phase = Phase::DecodingToken;
        vec![ShellEffect::Render(View::Loader)]
    }

    fn on_token(&mut self, token: TokenState) -> Vec<ShellEffect> {
        if self.phase != Phase::DecodingToken {
            debug!("Token read outside of a navigation, ignored");
            return Vec::new();
        }

        let mut effects = Vec::new();
        if token.is_rejected() {
            warn!("Discarding unusable session token: {:?}", token.fault());
            effects.push(ShellEffect::ClearToken);
        }
        self.adopt(token);
        effects.extend(self.decide());
        effects
    }

    fn on_subscription(
        &mut self,
        nav: NavigationId,
        result: Result<SubscriptionState, FetchFailure>,
    ) -> Vec<ShellEffect> {
        if !self.is_current(nav) {
            debug!("Ignoring stale subscription result for {:?}", nav);
            return Vec::new();
        }
        self.polling = false;

        match result {
            Ok(state) => {
                self.subscription = SubscriptionCache::Ready {
                    state,
                    stale: false,
                };
                self.decide()
            }
            Err(FetchFailure::Unauthorized) => self.revoke(),
            Err(FetchFailure::Unavailable(message)) => {
                if matches!(self.subscription, SubscriptionCache::Ready { .. }) {
                    warn!("Subscription re-check failed, keeping last status: {}", message);
                    return self.schedule_poll().into_iter().collect();
                }
                self.subscription = SubscriptionCache::Failed(nav, message);
                self.decide()
            }
        }
    }

    fn on_profile(
        &mut self,
        nav: NavigationId,
        photo: Result<Option<String>, FetchFailure>,
    ) -> Vec<ShellEffect> {
        if !self.is_current(nav) {
            debug!("Ignoring stale profile result for {:?}", nav);
            return Vec::new();
        }

        match photo {
            Ok(photo) => {
                self.profile = ProfileCache::Known(photo);
                if self.phase == Phase::Allowed {
                    vec![ShellEffect::Render(self.page_view())]
                } else {
                    Vec::new()
                }
            }
            Err(FetchFailure::Unauthorized) => self.revoke(),
            Err(FetchFailure::Unavailable(message)) => {
                warn!("Profile unavailable: {}", message);
                self.profile = ProfileCache::Known(None);
                Vec::new()
            }
        }
    }

    fn on_retry(&mut self) -> Vec<ShellEffect> {
        if self.phase != Phase::SubscriptionUnavailable {
            return Vec::new();
        }
        self.subscription = SubscriptionCache::Loading(self.nav);
        self.phase = Phase::FetchingSubscription;
        vec![
            ShellEffect::FetchSubscription {
                nav: self.nav,
                delay: Duration::ZERO,
            },
            ShellEffect::Render(View::Loader),
        ]
    }

    fn on_stale(&mut self) -> Vec<ShellEffect> {
        if let SubscriptionCache::Ready { stale, .. } = &mut self.subscription {
            debug!("Cached subscription marked stale");
            *stale = true;
        }
        Vec::new()
    }

    // -- helpers ------------------------------------------------------------

    /// Results only count for the live, undecided-or-allowed navigation.
    fn is_current(&self, nav: NavigationId) -> bool {
        nav == self.nav
            && !matches!(
                self.phase,
                Phase::Initializing | Phase::DecodingToken | Phase::Redirecting { .. }
            )
    }

    fn adopt(&mut self, token: TokenState) {
        let session = token.claims().map(|c| (c.user_id.clone(), c.role.clone()));
        if session != self.session {
            debug!("Session changed, cached subscription and profile dropped");
            self.session = session;
            self.subscription = SubscriptionCache::Unknown;
            self.profile = ProfileCache::Unknown;
        }
        self.token = token;
    }

    fn revoke(&mut self) -> Vec<ShellEffect> {
        warn!("Session rejected by the API, signing out");
        self.adopt(TokenState::Missing);
        let mut effects = vec![ShellEffect::ClearToken];
        effects.extend(self.decide());
        effects
    }

    fn decide(&mut self) -> Vec<ShellEffect> {
        self.phase = Phase::Deciding;
        let class = self.classifier.classify(&self.path);

        let mut effects = Vec::new();
        let gate = self.gate(class, &mut effects);
        let verdict = self.policy.evaluate(&AccessRequest {
            path: &self.path,
            class,
            token: &self.token,
            subscription: gate,
        });

        match verdict.decision {
            Decision::RedirectTo(target) => {
                debug!("{} -> {} ({:?})", self.path, target, verdict.reason);
                self.phase = Phase::Redirecting {
                    target: target.clone(),
                };
                effects.push(ShellEffect::Navigate { to: target });
            }
            Decision::ShowLoader if gate == SubscriptionGate::Unavailable => {
                let message = match &self.subscription {
                    SubscriptionCache::Failed(_, m) => {
                        format!("Could not check your subscription: {}", m)
                    }
                    _ => "Could not check your subscription".to_string(),
                };
                self.phase = Phase::SubscriptionUnavailable;
                effects.push(ShellEffect::Render(View::Unavailable { message }));
            }
            Decision::ShowLoader => {
                self.phase = Phase::FetchingSubscription;
                effects.push(ShellEffect::Render(View::Loader));
            }
            Decision::Allow => {
                self.phase = Phase::Allowed;
                effects.push(ShellEffect::Render(self.page_view()));
                effects.extend(self.profile_fetch());
                effects.extend(self.schedule_poll());
            }
        }
        effects
    }

    /// Subscription input for the engine; issues a fetch when nothing usable
    /// is known for this navigation. A stale cached status is still served
    /// while its replacement is fetched.
    fn gate(&mut self, class: RouteClass, effects: &mut Vec<ShellEffect>) -> SubscriptionGate {
        let needs_subscription = class == RouteClass::AdminProtected
            && self
                .token
                .claims()
                .is_some_and(|c| c.role == Role::Admin && !c.is_master);
        if !needs_subscription {
            return SubscriptionGate::NotRequired;
        }

        match &self.subscription {
            SubscriptionCache::Ready { state, stale } => {
                if *stale && !self.polling {
                    // Shares the poll slot so a pending payment is not
                    // checked twice.
                    self.polling = true;
                    effects.push(ShellEffect::FetchSubscription {
                        nav: self.nav,
                        delay: Duration::ZERO,
                    });
                }
                SubscriptionGate::Ready(*state)
            }
            SubscriptionCache::Loading(nav) if *nav == self.nav => SubscriptionGate::Loading,
            SubscriptionCache::Failed(nav, _) if *nav == self.nav => SubscriptionGate::Unavailable,
            _ => {
                self.subscription = SubscriptionCache::Loading(self.nav);
                effects.push(ShellEffect::FetchSubscription {
                    nav: self.nav,
                    delay: Duration::ZERO,
                });
                SubscriptionGate::Loading
            }
        }
    }

    fn profile_fetch(&mut self) -> Option<ShellEffect> {
        if !self.token.claims().is_some_and(|c| c.is_admin()) {
            return None;
        }
        match self.profile {
            ProfileCache::Known(_) => None,
            ProfileCache::Loading(nav) if nav == self.nav => None,
            _ => {
                self.profile = ProfileCache::Loading(self.nav);
                Some(ShellEffect::FetchProfile { nav: self.nav })
            }
        }
    }

    /// Re-check while a payment is pending and nothing is active yet.
    fn schedule_poll(&mut self) -> Option<ShellEffect> {
        if self.polling || self.phase != Phase::Allowed {
            return None;
        }
        let SubscriptionCache::Ready { state, .. } = &self.subscription else {
            return None;
        };
        if state.effective_subscribed() || !state.has_pending() {
            return None;
        }
        self.polling = true;
        Some(ShellEffect::FetchSubscription {
            nav: self.nav,
            delay: self.poll_interval,
        })
    }

    fn page_view(&self) -> View {
        View::Page {
            path: self.path.clone(),
            chrome: self.chrome(),
        }
    }

    fn chrome(&self) -> Option<Chrome> {
        if !self.classifier.classify(&self.path).is_protected() {
            return None;
        }
        let claims = self.token.claims()?;
        if matches!(claims.role, Role::Other(_)) {
            return None;
        }

        let fetched = match &self.subscription {
            SubscriptionCache::Ready { state, .. } => Some(*state),
            _ => None,
        };
        let is_master = claims.is_master || fetched.is_some_and(|s| s.is_master);
        let subscribed = is_master || fetched.is_some_and(|s| s.effective_subscribed());
        let photo = match &self.profile {
            ProfileCache::Known(p) => p.clone(),
            _ => None,
        };

        Some(Chrome::for_session(&claims.role, is_master, subscribed, photo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared::access::RouteTables;
    use shared::types::Claims;
    use shared::types::server_config::{DestinationsConfig, RoutesConfig};

    const POLL: Duration = Duration::from_secs(3);

    fn guard() -> ShellGuard {
        let classifier =
            RouteClassifier::new(RouteTables::from_config(&RoutesConfig::default()).unwrap());
        let policy = AccessPolicy::from_config(&DestinationsConfig::default(), &classifier).unwrap();
        ShellGuard::new(classifier, policy, POLL)
    }

    fn valid(role: Role) -> TokenState {
        TokenState::Valid(Claims::new("u1", role, i64::MAX))
    }

    fn visit(g: &mut ShellGuard, path: &str, token: TokenState) -> Vec<ShellEffect> {
        assert_eq!(
            g.handle(ShellEvent::Navigated { path: path.into() }),
            vec![ShellEffect::Render(View::Loader)]
        );
        g.handle(ShellEvent::TokenRead(token))
    }

    fn subscribed() -> SubscriptionState {
        SubscriptionState {
            is_subscribed: true,
            ..Default::default()
        }
    }

    fn navigations(effects: &[ShellEffect]) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|e| match e {
                ShellEffect::Navigate { to } => Some(to.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn admin_waits_for_subscription_then_sees_page() {
        let mut g = guard();
        let effects = visit(&mut g, "/dashboard", valid(Role::Admin));
        let nav = g.navigation();
        assert_eq!(
            effects,
            vec![
                ShellEffect::FetchSubscription {
                    nav,
                    delay: Duration::ZERO
                },
                ShellEffect::Render(View::Loader),
            ]
        );
        assert_eq!(g.phase(), &Phase::FetchingSubscription);

        let effects = g.handle(ShellEvent::SubscriptionResolved {
            nav,
            result: Ok(subscribed()),
        });
        assert_eq!(g.phase(), &Phase::Allowed);
        assert!(matches!(
            &effects[0],
            ShellEffect::Render(View::Page { path, chrome: Some(_) }) if path == "/dashboard"
        ));
        assert_eq!(effects[1], ShellEffect::FetchProfile { nav });
    }

    #[test]
    fn unsubscribed_admin_is_redirected_once() {
        let mut g = guard();
        visit(&mut g, "/dashboard", valid(Role::Admin));
        let nav = g.navigation();

        let effects = g.handle(ShellEvent::SubscriptionResolved {
            nav,
            result: Ok(SubscriptionState::default()),
        });
        assert_eq!(navigations(&effects), vec!["/dashboard/subscription"]);

        // Anything else for this navigation is moot.
        assert!(g.handle(ShellEvent::SubscriptionResolved {
            nav,
            result: Ok(SubscriptionState::default()),
        })
        .is_empty());
        assert!(g.handle(ShellEvent::ProfileResolved { nav, photo: Ok(None) }).is_empty());
    }

    #[test]
    fn navigating_away_cancels_the_check() {
        let mut g = guard();
        visit(&mut g, "/dashboard", valid(Role::Admin));
        let first = g.navigation();

        visit(&mut g, "/payments", valid(Role::Admin));
        assert!(g.handle(ShellEvent::SubscriptionResolved {
            nav: first,
            result: Ok(SubscriptionState::default()),
        })
        .is_empty());
        assert_eq!(g.phase(), &Phase::FetchingSubscription);
    }

    #[test]
    fn subscription_is_cached_for_the_session() {
        let mut g = guard();
        visit(&mut g, "/dashboard", valid(Role::Admin));
        let nav = g.navigation();
        g.handle(ShellEvent::SubscriptionResolved {
            nav,
            result: Ok(subscribed()),
        });

        let effects = visit(&mut g, "/payments", valid(Role::Admin));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, ShellEffect::FetchSubscription { .. })));
        assert_eq!(g.phase(), &Phase::Allowed);
    }

    #[test]
    fn stale_subscription_is_served_while_refetched() {
        let mut g = guard();
        visit(&mut g, "/dashboard", valid(Role::Admin));
        g.handle(ShellEvent::SubscriptionResolved {
            nav: g.navigation(),
            result: Ok(subscribed()),
        });
        assert!(g.handle(ShellEvent::SubscriptionStale).is_empty());

        let effects = visit(&mut g, "/payments", valid(Role::Admin));
        let nav = g.navigation();
        assert!(effects.contains(&ShellEffect::FetchSubscription {
            nav,
            delay: Duration::ZERO
        }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, ShellEffect::Render(View::Page { path, .. }) if path == "/payments")));
        assert_eq!(g.phase(), &Phase::Allowed);

        // The subscription lapsed since it was cached.
        let effects = g.handle(ShellEvent::SubscriptionResolved {
            nav,
            result: Ok(SubscriptionState::default()),
        });
        assert_eq!(navigations(&effects), vec!["/dashboard/subscription"]);
    }

    #[test]
    fn failed_refresh_keeps_the_cached_status() {
        let mut g = guard();
        visit(&mut g, "/dashboard", valid(Role::Admin));
        g.handle(ShellEvent::SubscriptionResolved {
            nav: g.navigation(),
            result: Ok(subscribed()),
        });
        g.handle(ShellEvent::SubscriptionStale);
        visit(&mut g, "/payments", valid(Role::Admin));

        let effects = g.handle(ShellEvent::SubscriptionResolved {
            nav: g.navigation(),
            result: Err(FetchFailure::Unavailable("down".into())),
        });
        assert!(navigations(&effects).is_empty());
        assert_eq!(g.phase(), &Phase::Allowed);

        // Still stale, so the next gated page tries again.
        let effects = visit(&mut g, "/dashboard", valid(Role::Admin));
        assert!(effects
            .iter()
            .any(|e| matches!(e, ShellEffect::FetchSubscription { .. })));
        assert_eq!(g.phase(), &Phase::Allowed);
    }

    #[test]
    fn failure_is_visible_and_retryable() {
        let mut g = guard();
        visit(&mut g, "/dashboard", valid(Role::Admin));
        let nav = g.navigation();

        let effects = g.handle(ShellEvent::SubscriptionResolved {
            nav,
            result: Err(FetchFailure::Unavailable("timeout".into())),
        });
        assert_eq!(g.phase(), &Phase::SubscriptionUnavailable);
        assert!(matches!(&effects[..], [ShellEffect::Render(View::Unavailable { .. })]));

        let effects = g.handle(ShellEvent::RetrySubscription);
        assert_eq!(
            effects[0],
            ShellEffect::FetchSubscription {
                nav,
                delay: Duration::ZERO
            }
        );
        assert_eq!(g.phase(), &Phase::FetchingSubscription);
    }

    #[test]
    fn expired_token_is_cleared_before_login_redirect() {
        let mut g = guard();
        let effects = visit(&mut g, "/student/profile", TokenState::Expired);
        assert_eq!(
            effects,
            vec![
                ShellEffect::ClearToken,
                ShellEffect::Navigate {
                    to: "/auth/login?redirect=%2Fstudent%2Fprofile".into()
                },
            ]
        );
    }

    #[test]
    fn malformed_token_on_login_page_is_cleared_and_allowed() {
        let mut g = guard();
        let effects = visit(&mut g, "/auth/login", TokenState::Malformed);
        assert_eq!(effects[0], ShellEffect::ClearToken);
        assert_eq!(g.phase(), &Phase::Allowed);
    }

    #[test]
    fn unauthorized_api_response_signs_out() {
        let mut g = guard();
        visit(&mut g, "/settings", valid(Role::Admin));
        let nav = g.navigation();

        let effects = g.handle(ShellEvent::SubscriptionResolved {
            nav,
            result: Err(FetchFailure::Unauthorized),
        });
        assert_eq!(
            effects,
            vec![
                ShellEffect::ClearToken,
                ShellEffect::Navigate {
                    to: "/auth/login?redirect=%2Fsettings".into()
                },
            ]
        );
    }

    #[test]
    fn pending_payment_is_polled() {
        let mut g = guard();
        visit(&mut g, "/dashboard/subscription", valid(Role::Admin));
        let nav = g.navigation();

        let pending = SubscriptionState {
            pending_subscriptions: 1,
            ..Default::default()
        };
        let effects = g.handle(ShellEvent::SubscriptionResolved {
            nav,
            result: Ok(pending),
        });
        assert!(effects.contains(&ShellEffect::FetchSubscription { nav, delay: POLL }));

        // Payment went through.
        let effects = g.handle(ShellEvent::SubscriptionResolved {
            nav,
            result: Ok(subscribed()),
        });
        assert!(!effects
            .iter()
            .any(|e| matches!(e, ShellEffect::FetchSubscription { .. })));
        assert_eq!(g.phase(), &Phase::Allowed);
    }

    #[test]
    fn profile_photo_reaches_the_chrome() {
        let mut g = guard();
        visit(&mut g, "/profile", valid(Role::Admin));
        let nav = g.navigation();
        g.handle(ShellEvent::SubscriptionResolved {
            nav,
            result: Ok(subscribed()),
        });

        let effects = g.handle(ShellEvent::ProfileResolved {
            nav,
            photo: Ok(Some("https://cdn/p.png".into())),
        });
        match &effects[..] {
            [ShellEffect::Render(View::Page { chrome: Some(c), .. })] => {
                assert_eq!(c.profile_image.as_deref(), Some("https://cdn/p.png"));
            }
            other => panic!("unexpected effects {:?}", other),
        }
    }

    #[test]
    fn student_needs_no_subscription() {
        let mut g = guard();
        let effects = visit(&mut g, "/student", valid(Role::Student));
        assert!(matches!(
            &effects[..],
            [ShellEffect::Render(View::Page { chrome: Some(c), .. })] if c.home_link == "/student"
        ));
    }

    #[test]
    fn master_token_skips_the_fetch() {
        let mut g = guard();
        let master = TokenState::Valid(Claims::new("m", Role::Admin, i64::MAX).with_master(true));
        let effects = visit(&mut g, "/master/plans", master);
        assert!(!effects
            .iter()
            .any(|e| matches!(e, ShellEffect::FetchSubscription { .. })));
        assert_eq!(g.phase(), &Phase::Allowed);
    }

    // -- properties ---------------------------------------------------------

    fn path() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "/", "/auth/login", "/dashboard", "/payments", "/profile", "/student",
            "/student/requests", "/dashboard/subscription", "/elsewhere",
        ])
        .prop_map(str::to_string)
    }

    fn token() -> impl Strategy<Value = TokenState> {
        prop_oneof![
            Just(TokenState::Missing),
            Just(TokenState::Malformed),
            Just(TokenState::Expired),
            Just(valid(Role::Admin)),
            Just(valid(Role::Student)),
            Just(valid(Role::Other("guest".into()))),
        ]
    }

    fn result() -> impl Strategy<Value = Result<SubscriptionState, FetchFailure>> {
        prop_oneof![
            Just(Ok(SubscriptionState::default())),
            Just(Ok(subscribed())),
            Just(Ok(SubscriptionState {
                pending_subscriptions: 2,
                ..Default::default()
            })),
            Just(Err(FetchFailure::Unauthorized)),
            Just(Err(FetchFailure::Unavailable("down".into()))),
        ]
    }

    #[derive(Debug, Clone)]
    enum Step {
        Visit(String, TokenState),
        Subscription(u64, Result<SubscriptionState, FetchFailure>),
        Profile(u64),
        Retry,
        Stale,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (path(), token()).prop_map(|(p, t)| Step::Visit(p, t)),
            (0u64..3, result()).prop_map(|(back, r)| Step::Subscription(back, r)),
            (0u64..3).prop_map(Step::Profile),
            Just(Step::Retry),
            Just(Step::Stale),
        ]
    }

    proptest! {
        #[test]
        fn at_most_one_navigate_per_navigation(steps in prop::collection::vec(step(), 1..40)) {
            let mut g = guard();
            let mut redirects: std::collections::HashMap<NavigationId, usize> = Default::default();

            for step in steps {
                let (nav_before, effects) = match step {
                    Step::Visit(p, t) => {
                        g.handle(ShellEvent::Navigated { path: p });
                        (g.navigation(), g.handle(ShellEvent::TokenRead(t)))
                    }
                    Step::Subscription(back, result) => {
                        let nav = NavigationId(g.navigation().0.saturating_sub(back));
                        (g.navigation(), g.handle(ShellEvent::SubscriptionResolved { nav, result }))
                    }
                    Step::Profile(back) => {
                        let nav = NavigationId(g.navigation().0.saturating_sub(back));
                        (g.navigation(), g.handle(ShellEvent::ProfileResolved { nav, photo: Ok(None) }))
                    }
                    Step::Retry => (g.navigation(), g.handle(ShellEvent::RetrySubscription)),
                    Step::Stale => (g.navigation(), g.handle(ShellEvent::SubscriptionStale)),
                };
                *redirects.entry(nav_before).or_default() += navigations(&effects).len();
                prop_assert!(redirects[&nav_before] <= 1);
            }
        }
    }
}
