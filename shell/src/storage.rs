//! File-backed token slots under the shell's state directory.
//!
//! `session.json` plays the durable store and `cookies.json` the cookie jar.
//! Both are tiny JSON documents rewritten whole on every save.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use shared::access::{MirroredTokenStore, RawToken, StoreError, TokenSlot, unix_now};

pub const SESSION_FILE: &str = "session.json";
pub const COOKIE_FILE: &str = "cookies.json";

pub type FileTokenStore = MirroredTokenStore<DurableFileSlot, CookieFileSlot>;

/// Both slots rooted at `state_dir`.
pub fn open(state_dir: &Path, default_ttl: Duration) -> FileTokenStore {
    MirroredTokenStore::new(
        DurableFileSlot::new(state_dir.join(SESSION_FILE)),
        CookieFileSlot::new(state_dir.join(COOKIE_FILE)),
        default_ttl,
    )
}

/// `~/x` → `$HOME/x`; anything else unchanged.
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Durable slot
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    token: String,
}

#[derive(Debug, Clone)]
pub struct DurableFileSlot {
    path: PathBuf,
}

impl DurableFileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenSlot for DurableFileSlot {
    fn load(&self) -> Result<Option<RawToken>, StoreError> {
        let record: Option<SessionRecord> = read_json(&self.path)?;
        Ok(record
            .filter(|r| !r.token.is_empty())
            .map(|r| RawToken::new(r.token)))
    }

    /// The durable store does not expire; `ttl` is ignored.
    fn save(&self, token: &RawToken, _ttl: Duration) -> Result<(), StoreError> {
        write_json(
            &self.path,
            &SessionRecord {
                token: token.as_str().to_string(),
            },
        )
    }

    fn remove(&self) -> Result<(), StoreError> {
        remove_file(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Cookie slot
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct CookieRecord {
    value: String,
    /// Unix seconds.
    expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct CookieFileSlot {
    path: PathBuf,
}

impl CookieFileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenSlot for CookieFileSlot {
    fn load(&self) -> Result<Option<RawToken>, StoreError> {
        let Some(record) = read_json::<CookieRecord>(&self.path)? else {
            return Ok(None);
        };
        if record.expires_at <= unix_now() {
            debug!("Cookie in {} has expired", self.path.display());
            return Ok(None);
        }
        Ok(Some(RawToken::new(record.value)).filter(|t| !t.as_str().is_empty()))
    }

    fn save(&self, token: &RawToken, ttl: Duration) -> Result<(), StoreError> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        write_json(
            &self.path,
            &CookieRecord {
                value: token.as_str().to_string(),
                expires_at: unix_now().saturating_add(ttl),
            },
        )
    }

    fn remove(&self) -> Result<(), StoreError> {
        remove_file(&self.path)
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            return Err(e.into());
        }
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))?;

    // Rename over the old file so a crash never leaves half a document.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_file(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => {
            error!("Failed to remove {}: {}", path.display(), e);
            Err(e.into())
        }
    }
}
