use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::header::{HeaderMap, HeaderValue};
use hyper::{Request, Response, StatusCode, Uri};
use tower::{Layer, Service};
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use shared::access::routes::{canonical_path, prefix_matches};
use shared::access::{AccessControl, Decision, RawToken, SubscriptionGate, TokenSlot, unix_now};
use shared::types::{AppConfig, ConfigError};

use super::cookie_view::CookieView;
use crate::handlers::utils::{deliver_error_json, deliver_redirect_with_cookie, internal_error};

// ---------------------------------------------------------------------------
// EdgeGuard
// ---------------------------------------------------------------------------

/// What the edge does with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeOutcome {
    Pass,
    Redirect {
        location: String,
        set_cookie: Option<String>,
    },
    /// Path climbs out of the site with `..`.
    Reject,
}

/// Request-time access check. Sees only the cookie and never knows the
/// subscription, so the wall is left to the client shell.
#[derive(Debug)]
pub struct EdgeGuard {
    access: AccessControl,
    cookie_name: String,
    passthrough: Vec<String>,
}

impl EdgeGuard {
    pub fn new(access: AccessControl, cookie_name: impl Into<String>, passthrough: Vec<String>) -> Self {
        let passthrough = passthrough
            .into_iter()
            .map(|p| {
                let t = p.trim().trim_end_matches('/');
                if t.is_empty() { "/".to_string() } else { t.to_string() }
            })
            .collect();
        Self {
            access,
            cookie_name: cookie_name.into(),
            passthrough,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let secret = config.auth.resolved_jwt_secret().ok_or_else(|| {
            ConfigError::InvalidConfig("jwt_secret is not set".into())
        })?;
        let access = AccessControl::from_config(config, &secret)?;
        Ok(Self::new(
            access,
            config.auth.cookie_name.clone(),
            config.routes.verify_passthrough.clone(),
        ))
    }

    /// Verification links carry their own token in the query string.
    fn is_passthrough(&self, uri: &Uri) -> bool {
        uri.query().is_some_and(|q| !q.is_empty())
            && self
                .passthrough
                .iter()
                .any(|prefix| prefix_matches(prefix, uri.path()))
    }

    pub fn check(&self, uri: &Uri, headers: &HeaderMap, now: i64) -> EdgeOutcome {
        let Some(canonical) = canonical_path(uri.path()) else {
            warn!("Refusing path with parent segments: {}", uri.path());
            return EdgeOutcome::Reject;
        };
        if canonical != uri.path() {
            debug!("Canonicalizing {} -> {}", uri.path(), canonical);
            let location = match uri.query() {
                Some(q) => format!("{}?{}", canonical, q),
                None => canonical,
            };
            return EdgeOutcome::Redirect {
                location,
                set_cookie: None,
            };
        }

        if self.is_passthrough(uri) {
            debug!("Verification link passes through");
            return EdgeOutcome::Pass;
        }

        let view = CookieView::from_headers(headers, &self.cookie_name);
        let raw = view.load().unwrap_or_else(|e| {
            warn!("Cookie unreadable: {}", e);
            None
        });

        let (token, verdict) = self.access.evaluate(
            uri.path(),
            raw.as_ref().map(RawToken::as_str),
            SubscriptionGate::Deferred,
            now,
        );

        match verdict.decision {
            // The edge cannot render a loader; the shell will.
            Decision::Allow | Decision::ShowLoader => EdgeOutcome::Pass,
            Decision::RedirectTo(location) => {
                if token.is_rejected() {
                    warn!(
                        "Rejected session token on {}: {:?}",
                        uri.path(),
                        verdict.reason
                    );
                    if let Err(e) = view.remove() {
                        error!("Failed to queue cookie removal: {}", e);
                    }
                } else {
                    debug!(
                        "Redirecting {} -> {} ({:?})",
                        uri.path(),
                        location,
                        verdict.reason
                    );
                }
                EdgeOutcome::Redirect {
                    location,
                    set_cookie: view.take_set_cookies().pop(),
                }
            }
        }
    }

    fn respond(location: &str, set_cookie: Option<String>) -> Response<BoxBody<Bytes, Infallible>> {
        let cookie = set_cookie.and_then(|c| HeaderValue::from_str(&c).ok());
        deliver_redirect_with_cookie(location, cookie).unwrap_or_else(|e| {
            error!("{:#}", e);
            internal_error()
        })
    }

    fn reject() -> Response<BoxBody<Bytes, Infallible>> {
        deliver_error_json("BAD_PATH", "Malformed request path", StatusCode::BAD_REQUEST)
            .unwrap_or_else(|e| {
                error!("{:#}", e);
                internal_error()
            })
    }
}

// ---------------------------------------------------------------------------
// Layer
// ---------------------------------------------------------------------------

/// Tower layer running the edge access check in front of the page server.
#[derive(Clone)]
pub struct EdgeGuardLayer {
    guard: Arc<EdgeGuard>,
}

impl EdgeGuardLayer {
    pub fn new(guard: Arc<EdgeGuard>) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for EdgeGuardLayer {
    type Service = EdgeGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EdgeGuardService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

#[derive(Clone)]
pub struct EdgeGuardService<S> {
    inner: S,
    guard: Arc<EdgeGuard>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for EdgeGuardService<S>
where
    S: Service<Request<ReqBody>, Response = Response<BoxBody<Bytes, Infallible>>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "request",
            id = %request_id,
            method = %req.method(),
            path = %req.uri().path()
        );

        let outcome = span.in_scope(|| self.guard.check(req.uri(), req.headers(), unix_now()));
        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let mut response = match outcome {
                    EdgeOutcome::Pass => inner.call(req).await?,
                    EdgeOutcome::Redirect {
                        location,
                        set_cookie,
                    } => EdgeGuard::respond(&location, set_cookie),
                    EdgeOutcome::Reject => EdgeGuard::reject(),
                };
                if let Ok(v) = HeaderValue::from_str(&request_id) {
                    response.headers_mut().insert("x-request-id", v);
                }
                debug!("Responded {}", response.status());
                Ok(response)
            }
            .instrument(span),
        )
    }
}
