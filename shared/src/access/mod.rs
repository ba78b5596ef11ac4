//! Access-control core.
//!
//! Leaves first: token storage → claim decoding → route classification →
//! the decision engine. Nothing in here performs network I/O; the edge server
//! and the client shell supply tokens, paths, and subscription state and act
//! on the resulting [`Decision`].

pub mod claims;
pub mod cookie;
pub mod decision;
mod error;
pub mod nav;
pub mod routes;
pub mod token_store;

pub use self::claims::{
    ClaimDecoder, DecodeError, SignError, TokenSigner, TokenState, is_expired, unix_now,
};
pub use self::decision::{
    AccessPolicy, AccessRequest, Decision, Destinations, PolicyError, SubscriptionGate,
    SubscriptionState, Verdict,
};
pub use self::error::AccessError;
pub use self::nav::{Chrome, NavItem};
pub use self::routes::{RouteClass, RouteClassifier, RouteTableError, RouteTables};
pub use self::token_store::{
    MemorySlot, MirroredTokenStore, RawToken, Reconciliation, StoreError, TokenSlot, TokenStore,
};

use crate::types::AppConfig;

/// The immutable access-control pieces every guard needs, built once from
/// configuration.
#[derive(Debug, Clone)]
pub struct AccessControl {
    pub decoder: ClaimDecoder,
    pub classifier: RouteClassifier,
    pub policy: AccessPolicy,
}

impl AccessControl {
    pub fn new(decoder: ClaimDecoder, classifier: RouteClassifier, policy: AccessPolicy) -> Self {
        Self {
            decoder,
            classifier,
            policy,
        }
    }

    /// Validates the route tables and destinations; the secret must already
    /// have been resolved.
    pub fn from_config(config: &AppConfig, secret: &str) -> Result<Self, crate::types::ConfigError> {
        let tables = RouteTables::from_config(&config.routes)?;
        let classifier = RouteClassifier::new(tables);
        let policy = AccessPolicy::from_config(&config.destinations, &classifier)?;
        Ok(Self::new(ClaimDecoder::new(secret), classifier, policy))
    }

    /// Decode `raw`, classify `path`, and decide.
    pub fn evaluate(
        &self,
        path: &str,
        raw: Option<&str>,
        subscription: SubscriptionGate,
        now: i64,
    ) -> (TokenState, Verdict) {
        let token = self.decoder.evaluate(raw, now);
        let verdict = self.policy.evaluate(&AccessRequest {
            path,
            class: self.classifier.classify(path),
            token: &token,
            subscription,
        });
        (token, verdict)
    }
}
