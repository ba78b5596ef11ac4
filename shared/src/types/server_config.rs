use serde::Deserialize;
use thiserror::Error;

use crate::access::{PolicyError, RouteTableError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Route tables rejected: {0}")]
    Routes(#[from] RouteTableError),

    #[error("Access policy rejected: {0}")]
    Policy(#[from] PolicyError),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    pub web_dir: String,
    /// File under `web_dir` served with 404 for unknown pages.
    #[serde(default = "default_not_found")]
    pub not_found: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HMAC key used to verify session tokens.
    ///
    /// Prefer loading this via the `JWT_SECRET` environment variable; this
    /// field is the fallback. **Minimum length:** 32 characters. Read once at
    /// startup.
    pub jwt_secret: Option<String>,
    /// Name of the edge-visible cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// `Max-Age` for the token cookie; also used when the cookie is healed
    /// from the durable copy.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

/// Path-prefix tables. Fixed at startup.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RoutesConfig {
    pub public: Vec<String>,
    pub admin: Vec<String>,
    pub student: Vec<String>,
    /// Prefixes whose requests bypass the edge entirely when they carry a
    /// query string (e-mail verification links).
    pub verify_passthrough: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DestinationsConfig {
    pub login: String,
    pub admin_home: String,
    pub student_home: String,
    pub subscription_wall: String,
    pub subscription_exempt: Vec<String>,
}

/// REST collaborators used by the client shell.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub subscription_status: String,
    pub admin_profile: String,
    pub timeout_secs: u64,
    /// Re-poll interval while a subscription payment is pending.
    pub poll_interval_ms: u64,
    /// Age at which a cached subscription status is re-checked.
    pub subscription_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ShellConfig {
    pub state_dir: String,
    /// Client-side redirect hops allowed before the shell halts.
    pub max_redirects: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub destinations: DestinationsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub shell: ShellConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"127.0.0.1:3000"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl AuthConfig {
    /// Resolve the JWT secret with `JWT_SECRET` env-var taking priority over
    /// the config file field.
    ///
    /// Returns `None` when neither source is set (startup treats this as a
    /// hard error).
    pub fn resolved_jwt_secret(&self) -> Option<String> {
        std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.jwt_secret.clone())
            .filter(|s| !s.is_empty())
    }
}

impl ApiConfig {
    pub fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            public: strings(&[
                "/",
                "/auth/login",
                "/auth/signup",
                "/auth/verify",
                "/auth/forgot-password",
                "/auth/confirm-password",
            ]),
            admin: strings(&[
                "/dashboard",
                "/profile",
                "/settings",
                "/settings/shifts",
                "/analytics",
                "/students",
                "/configure/shifts",
                "/configure/shifts-configured",
                "/configure/seats",
                "/configure/students/add-student",
                "/configure/students/student-list",
                "/payments",
                "/past/students",
                "/plans",
                "/master/plans",
            ]),
            student: strings(&["/student"]),
            verify_passthrough: strings(&["/auth/verify"]),
        }
    }
}

impl Default for DestinationsConfig {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            admin_home: "/dashboard".to_string(),
            student_home: "/student".to_string(),
            subscription_wall: "/dashboard/subscription".to_string(),
            subscription_exempt: strings(&["/profile", "/plans", "/dashboard/subscription"]),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            subscription_status: "/admin/subscription-status".to_string(),
            admin_profile: "/admin/profile".to_string(),
            timeout_secs: 10,
            poll_interval_ms: 3000,
            subscription_ttl_secs: 300,
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            state_dir: "~/.seatdesk".to_string(),
            max_redirects: 8,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn default_bind() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    3000
}

pub fn default_max_connections() -> usize {
    1000
}

pub fn default_not_found() -> String {
    "404.html".to_string()
}

pub fn default_cookie_name() -> String {
    "token".to_string()
}

/// One week, the lifetime the login form gives the cookie.
pub fn default_token_ttl() -> u64 {
    604_800
}
