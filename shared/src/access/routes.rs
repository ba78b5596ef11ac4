//! Path classification.
//!
//! Three prefix tables (public, admin, student) are validated once into a
//! [`RouteTables`] value and compiled into a [`RouteClassifier`]. A prefix
//! matches a path when the path equals it or continues with `/`, and the
//! longest matching prefix decides. The same prefix in two tables is a
//! startup error, so a tie can never reach request time.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::types::server_config::RoutesConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Public,
    AdminProtected,
    StudentProtected,
    /// Matches no table; always let through (404 pages, assets).
    Unclassified,
}

impl RouteClass {
    pub fn is_protected(self) -> bool {
        matches!(self, Self::AdminProtected | Self::StudentProtected)
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Public => "public",
            Self::AdminProtected => "admin",
            Self::StudentProtected => "student",
            Self::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("route prefix {prefix:?} is invalid: {reason}")]
    Invalid { prefix: String, reason: &'static str },

    #[error("route prefix {prefix:?} is listed as both {first} and {second}")]
    Conflict {
        prefix: String,
        first: RouteClass,
        second: RouteClass,
    },
}

// ---------------------------------------------------------------------------
// RouteTables
// ---------------------------------------------------------------------------

/// Validated, normalised prefix tables.
#[derive(Debug, Clone)]
pub struct RouteTables {
    entries: Vec<(String, RouteClass)>,
}

impl RouteTables {
    pub fn new<S: AsRef<str>>(
        public: &[S],
        admin: &[S],
        student: &[S],
    ) -> Result<Self, RouteTableError> {
        let mut seen: HashMap<String, RouteClass> = HashMap::new();
        let mut entries = Vec::new();

        let tables = [
            (public, RouteClass::Public),
            (admin, RouteClass::AdminProtected),
            (student, RouteClass::StudentProtected),
        ];

        for (prefixes, class) in tables {
            for raw in prefixes {
                let prefix = normalize_prefix(raw.as_ref())?;
                match seen.get(&prefix) {
                    Some(existing) if *existing == class => continue,
                    Some(existing) => {
                        return Err(RouteTableError::Conflict {
                            prefix,
                            first: *existing,
                            second: class,
                        });
                    }
                    None => {
                        seen.insert(prefix.clone(), class);
                        entries.push((prefix, class));
                    }
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn from_config(config: &RoutesConfig) -> Result<Self, RouteTableError> {
        Self::new(&config.public, &config.admin, &config.student)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_prefix(raw: &str) -> Result<String, RouteTableError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RouteTableError::Invalid {
            prefix: raw.to_string(),
            reason: "empty prefix",
        });
    }
    if !trimmed.starts_with('/') {
        return Err(RouteTableError::Invalid {
            prefix: raw.to_string(),
            reason: "must start with '/'",
        });
    }
    if trimmed.contains(['?', '#']) {
        return Err(RouteTableError::Invalid {
            prefix: raw.to_string(),
            reason: "must not contain a query or fragment",
        });
    }
    let without_slash = trimmed.trim_end_matches('/');
    Ok(if without_slash.is_empty() {
        "/".to_string()
    } else {
        without_slash.to_string()
    })
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// The path part of a request target: query string and fragment dropped.
pub fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// `path == prefix` or `path` starts with `prefix + "/"`.
pub fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/') && prefix != "/",
        None => false,
    }
}

/// Canonical spelling of a path: empty and `.` segments dropped, no trailing
/// slash. `None` when any segment is `..`.
///
/// Page lookup treats `//a`, `/./a` and `/a/` as `/a`, so classification must
/// only ever see the canonical form.
pub fn canonical_path(path: &str) -> Option<String> {
    let mut out = String::with_capacity(path.len());
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s => {
                out.push('/');
                out.push_str(s);
            }
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// RouteClassifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RouteClassifier {
    /// Longest prefix first.
    ordered: Vec<(String, RouteClass)>,
}

impl RouteClassifier {
    pub fn new(tables: RouteTables) -> Self {
        let mut ordered = tables.entries;
        ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        debug!("Route classifier built with {} prefixes", ordered.len());
        Self { ordered }
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        let clean = strip_query(path);
        self.ordered
            .iter()
            .find(|(prefix, _)| prefix_matches(prefix, clean))
            .map(|(_, class)| *class)
            .unwrap_or(RouteClass::Unclassified)
    }
}
