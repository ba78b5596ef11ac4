//! Session-token storage mirrored across two locations.
//!
//! The client keeps the token in a durable store; the edge can only see the
//! cookie. [`MirroredTokenStore`] keeps the two in step. Client-side writes
//! go through the [`TokenStore`] trait; the edge holds only the cookie slot of
//! the request it is answering.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// RawToken
// ---------------------------------------------------------------------------

/// Opaque signed token string. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct RawToken(String);

impl RawToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawToken(<{} bytes>)", self.0.len())
    }
}

impl From<&str> for RawToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("token storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("token storage is corrupt: {0}")]
    Corrupt(String),

    #[error("token storage is read-only")]
    ReadOnly,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One physical location for the token.
pub trait TokenSlot {
    fn load(&self) -> Result<Option<RawToken>, StoreError>;
    fn save(&self, token: &RawToken, ttl: Duration) -> Result<(), StoreError>;
    fn remove(&self) -> Result<(), StoreError>;
}

/// The token contract shared by the edge and client shell.
pub trait TokenStore {
    /// Current token, without healing.
    fn read(&self) -> Result<Option<RawToken>, StoreError>;

    /// Store `token` in every location.
    fn write(&self, token: &RawToken, ttl: Duration) -> Result<(), StoreError>;

    /// Remove the token from every location. Idempotent.
    fn clear(&self) -> Result<(), StoreError>;

    /// Heal divergence between the locations.
    fn reconcile(&self) -> Result<Reconciliation, StoreError>;
}

/// Outcome of [`TokenStore::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Both locations already held the same token.
    InSync,
    /// Neither location held a token.
    Empty,
    /// The cookie was copied into the durable store.
    CopiedToDurable,
    /// The durable value was copied into the cookie.
    CopiedToCookie,
    /// Both held different tokens; the cookie's value was kept.
    PreferredCookie,
}

// ---------------------------------------------------------------------------
// MirroredTokenStore
// ---------------------------------------------------------------------------

pub struct MirroredTokenStore<D, C> {
    durable: D,
    cookie: C,
    default_ttl: Duration,
}

impl<D: TokenSlot, C: TokenSlot> MirroredTokenStore<D, C> {
    /// `default_ttl` is the cookie lifetime used when the cookie is rebuilt
    /// from the durable copy.
    pub fn new(durable: D, cookie: C, default_ttl: Duration) -> Self {
        Self {
            durable,
            cookie,
            default_ttl,
        }
    }

    pub fn durable(&self) -> &D {
        &self.durable
    }

    pub fn cookie(&self) -> &C {
        &self.cookie
    }
}

impl<D: TokenSlot, C: TokenSlot> TokenStore for MirroredTokenStore<D, C> {
    fn read(&self) -> Result<Option<RawToken>, StoreError> {
        if let Some(token) = self.cookie.load()? {
            return Ok(Some(token));
        }
        self.durable.load()
    }

    fn write(&self, token: &RawToken, ttl: Duration) -> Result<(), StoreError> {
        self.durable.save(token, ttl)?;
        self.cookie.save(token, ttl)?;
        debug!("Token written to durable store and cookie");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        // Attempt both even when the first fails.
        let durable = self.durable.remove();
        let cookie = self.cookie.remove();
        durable?;
        cookie?;
        debug!("Token cleared from durable store and cookie");
        Ok(())
    }

    fn reconcile(&self) -> Result<Reconciliation, StoreError> {
        let durable = self.durable.load()?;
        let cookie = self.cookie.load()?;

        let outcome = match (durable, cookie) {
            (None, None) => Reconciliation::Empty,
            (Some(d), Some(c)) if d == c => Reconciliation::InSync,
            (Some(_), Some(c)) => {
                warn!("Durable token and cookie disagree; keeping the cookie");
                self.durable.save(&c, self.default_ttl)?;
                Reconciliation::PreferredCookie
            }
            (None, Some(c)) => {
                self.durable.save(&c, self.default_ttl)?;
                Reconciliation::CopiedToDurable
            }
            (Some(d), None) => {
                self.cookie.save(&d, self.default_ttl)?;
                Reconciliation::CopiedToCookie
            }
        };

        if outcome != Reconciliation::InSync && outcome != Reconciliation::Empty {
            warn!("Token storage diverged, healed: {:?}", outcome);
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// MemorySlot
// ---------------------------------------------------------------------------

/// In-process slot. Remembers the last TTL it was given.
#[derive(Debug, Default)]
pub struct MemorySlot {
    inner: Mutex<Option<(RawToken, Duration)>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holding(token: impl Into<String>, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Some((RawToken::new(token), ttl))),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.lock().ok().and_then(|g| g.as_ref().map(|(_, ttl)| *ttl))
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<(RawToken, Duration)>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Corrupt("memory slot lock poisoned".into()))
    }
}

impl TokenSlot for MemorySlot {
    fn load(&self) -> Result<Option<RawToken>, StoreError> {
        Ok(self.lock()?.as_ref().map(|(t, _)| t.clone()))
    }

    fn save(&self, token: &RawToken, ttl: Duration) -> Result<(), StoreError> {
        *self.lock()? = Some((token.clone(), ttl));
        Ok(())
    }

    fn remove(&self) -> Result<(), StoreError> {
        *self.lock()? = None;
        Ok(())
    }
}

impl<T: TokenSlot + ?Sized> TokenSlot for &T {
    fn load(&self) -> Result<Option<RawToken>, StoreError> {
        (**self).load()
    }

    fn save(&self, token: &RawToken, ttl: Duration) -> Result<(), StoreError> {
        (**self).save(token, ttl)
    }

    fn remove(&self) -> Result<(), StoreError> {
        (**self).remove()
    }
}
