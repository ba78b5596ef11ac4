//! The access decision engine.
//!
//! One pure function decides every navigation, at the edge and in the client
//! shell alike:
//!
//! | # | route class        | session                        | decision |
//! |---|--------------------|--------------------------------|----------|
//! | 1 | public             | valid admin / student          | role home |
//! | 2 | protected          | missing / malformed / expired  | login, with `?redirect=` |
//! | 3 | admin              | student / unknown role         | student home / login |
//! | 4 | student            | admin / unknown role           | admin home / login |
//! | 7 | admin              | admin, subscription not known  | loader |
//! | 5 | admin, not exempt  | admin, not master, unsubscribed| subscription wall |
//! | 6 | anything else      |                                | allow |
//!
//! Unclassified paths are always allowed.

use thiserror::Error;
use tracing::trace;

use super::claims::TokenState;
use super::routes::{RouteClass, RouteClassifier, prefix_matches, strip_query};
use super::AccessError;
use crate::types::server_config::DestinationsConfig;
use crate::types::{Claims, Role, SubscriptionStatusResponse};

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectTo(String),
    ShowLoader,
}

/// A decision plus the reason it was not a plain allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: Option<AccessError>,
}

impl Verdict {
    fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason: None,
        }
    }

    fn redirect(to: String, reason: Option<AccessError>) -> Self {
        Self {
            decision: Decision::RedirectTo(to),
            reason,
        }
    }

    fn loader(reason: Option<AccessError>) -> Self {
        Self {
            decision: Decision::ShowLoader,
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Admin subscription status as fetched from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionState {
    pub is_subscribed: bool,
    pub is_master: bool,
    pub pending_subscriptions: usize,
}

impl SubscriptionState {
    /// Masters are always subscribed.
    pub fn effective_subscribed(&self) -> bool {
        self.is_master || self.is_subscribed
    }

    pub fn has_pending(&self) -> bool {
        self.pending_subscriptions > 0
    }
}

impl From<&SubscriptionStatusResponse> for SubscriptionState {
    fn from(r: &SubscriptionStatusResponse) -> Self {
        Self {
            is_subscribed: r.subscription.as_ref().is_some_and(|s| s.is_active()),
            is_master: r.is_master,
            pending_subscriptions: r.pending_subscriptions.len(),
        }
    }
}

/// What the caller knows about the session's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionGate {
    /// The session is not an admin; nothing to check.
    NotRequired,
    /// The caller cannot know (the edge has no subscription data).
    Deferred,
    /// A fetch is in flight.
    Loading,
    /// The last fetch failed.
    Unavailable,
    Ready(SubscriptionState),
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Request path; a query string is tolerated and ignored for matching.
    pub path: &'a str,
    pub class: RouteClass,
    pub token: &'a TokenState,
    pub subscription: SubscriptionGate,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("{name} path {path:?} must not be a protected route")]
    ProtectedLogin { name: &'static str, path: String },

    #[error("{name} path {path:?} must classify as {expected}, found {found}")]
    WrongClass {
        name: &'static str,
        path: String,
        expected: RouteClass,
        found: RouteClass,
    },

    #[error("subscription wall {0:?} must be listed as subscription-exempt")]
    WallNotExempt(String),
}

/// Redirect targets used by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    pub login: String,
    pub admin_home: String,
    pub student_home: String,
    pub subscription_wall: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self::from(&DestinationsConfig::default())
    }
}

impl From<&DestinationsConfig> for Destinations {
    fn from(c: &DestinationsConfig) -> Self {
        Self {
            login: c.login.clone(),
            admin_home: c.admin_home.clone(),
            student_home: c.student_home.clone(),
            subscription_wall: c.subscription_wall.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    destinations: Destinations,
    subscription_exempt: Vec<String>,
}

impl AccessPolicy {
    /// Build a policy and check its destinations against `classifier` so a
    /// misconfiguration cannot produce a redirect loop.
    pub fn new(
        destinations: Destinations,
        subscription_exempt: Vec<String>,
        classifier: &RouteClassifier,
    ) -> Result<Self, PolicyError> {
        let login_class = classifier.classify(&destinations.login);
        if login_class.is_protected() {
            return Err(PolicyError::ProtectedLogin {
                name: "login",
                path: destinations.login.clone(),
            });
        }

        let expect = |name, path: &str, expected| {
            let found = classifier.classify(path);
            if found == expected {
                Ok(())
            } else {
                Err(PolicyError::WrongClass {
                    name,
                    path: path.to_string(),
                    expected,
                    found,
                })
            }
        };
        expect("admin_home", &destinations.admin_home, RouteClass::AdminProtected)?;
        expect("student_home", &destinations.student_home, RouteClass::StudentProtected)?;

        let subscription_exempt: Vec<String> = subscription_exempt
            .into_iter()
            .map(|p| {
                let t = p.trim().trim_end_matches('/');
                if t.is_empty() { "/".to_string() } else { t.to_string() }
            })
            .collect();

        let policy = Self {
            destinations,
            subscription_exempt,
        };
        if !policy.is_subscription_exempt(&policy.destinations.subscription_wall) {
            return Err(PolicyError::WallNotExempt(
                policy.destinations.subscription_wall.clone(),
            ));
        }
        Ok(policy)
    }

    pub fn from_config(
        config: &DestinationsConfig,
        classifier: &RouteClassifier,
    ) -> Result<Self, PolicyError> {
        Self::new(
            Destinations::from(config),
            config.subscription_exempt.clone(),
            classifier,
        )
    }

    pub fn destinations(&self) -> &Destinations {
        &self.destinations
    }

    pub fn is_subscription_exempt(&self, path: &str) -> bool {
        let clean = strip_query(path);
        self.subscription_exempt
            .iter()
            .any(|prefix| prefix_matches(prefix, clean))
    }

    /// `<login>?redirect=<path>`, form-urlencoded.
    pub fn login_with_return(&self, path: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
        format!("{}?redirect={}", self.destinations.login, encoded)
    }

    pub fn home_for(&self, role: &Role) -> Option<&str> {
        match role {
            Role::Admin => Some(self.destinations.admin_home.as_str()),
            Role::Student => Some(self.destinations.student_home.as_str()),
            Role::Other(_) => None,
        }
    }

    pub fn decide(&self, request: &AccessRequest<'_>) -> Decision {
        self.evaluate(request).decision
    }

    pub fn evaluate(&self, request: &AccessRequest<'_>) -> Verdict {
        let verdict = self.evaluate_inner(request);
        trace!(
            "decide {} [{}] -> {:?}",
            request.path, request.class, verdict.decision
        );
        verdict
    }

    fn evaluate_inner(&self, request: &AccessRequest<'_>) -> Verdict {
        let claims = request.token.claims();

        match (request.class, claims) {
            (RouteClass::Unclassified, _) => Verdict::allow(),

            // Rule 1
            (RouteClass::Public, Some(c)) => match self.home_for(&c.role) {
                Some(home) => Verdict::redirect(home.to_string(), None),
                None => Verdict::allow(),
            },
            (RouteClass::Public, None) => Verdict::allow(),

            // Rule 2
            (_, None) => Verdict::redirect(
                self.login_with_return(strip_query(request.path)),
                request.token.fault(),
            ),

            // Rule 3
            (RouteClass::AdminProtected, Some(c)) => match &c.role {
                Role::Admin => self.subscription_rule(request, c),
                other => Verdict::redirect(
                    self.home_for(other)
                        .unwrap_or(self.destinations.login.as_str())
                        .to_string(),
                    Some(AccessError::RoleMismatch {
                        expected: Role::Admin,
                        found: other.clone(),
                    }),
                ),
            },

            // Rule 4
            (RouteClass::StudentProtected, Some(c)) => match &c.role {
                Role::Student => Verdict::allow(),
                other => Verdict::redirect(
                    self.home_for(other)
                        .unwrap_or(self.destinations.login.as_str())
                        .to_string(),
                    Some(AccessError::RoleMismatch {
                        expected: Role::Student,
                        found: other.clone(),
                    }),
                ),
            },
        }
    }

    /// Rules 5 and 7 for an admin on an admin route.
    fn subscription_rule(&self, request: &AccessRequest<'_>, claims: &Claims) -> Verdict {
        if claims.is_master {
            return Verdict::allow();
        }

        match request.subscription {
            SubscriptionGate::NotRequired | SubscriptionGate::Deferred => Verdict::allow(),
            SubscriptionGate::Loading => Verdict::loader(None),
            SubscriptionGate::Unavailable => Verdict::loader(Some(AccessError::NetworkFailure(
                "subscription status unavailable".into(),
            ))),
            SubscriptionGate::Ready(state) => {
                if state.effective_subscribed() || self.is_subscription_exempt(request.path) {
                    Verdict::allow()
                } else {
                    Verdict::redirect(
                        self.destinations.subscription_wall.clone(),
                        Some(AccessError::SubscriptionRequired),
                    )
                }
            }
        }
    }
}
