use thiserror::Error;

use crate::types::Role;

/// Why a navigation was not simply allowed.
///
/// The first three variants all mean "unauthenticated"; the engine does not
/// route them differently, they only end up in logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("no session token")]
    TokenMissing,

    #[error("session token could not be decoded")]
    TokenMalformed,

    #[error("session token has expired")]
    TokenExpired,

    #[error("route requires role {expected}, session has {found}")]
    RoleMismatch { expected: Role, found: Role },

    #[error("an active subscription is required")]
    SubscriptionRequired,

    #[error("collaborator request failed: {0}")]
    NetworkFailure(String),
}

impl AccessError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::TokenMissing | Self::TokenMalformed | Self::TokenExpired
        )
    }
}
