//! REST collaborators the shell consults once it has a valid session.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION};
use http_body_util::{BodyExt, Empty};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use shared::access::RawToken;
use shared::types::server_config::ApiConfig;
use shared::types::{ProfileResponse, SubscriptionStatusResponse};

use crate::machine::FetchFailure;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("the API rejected the session token")]
    Unauthorized,

    #[error("the API answered with status {0}")]
    Status(u16),

    #[error("could not reach the API: {0}")]
    Transport(String),

    #[error("the API did not answer in time")]
    Timeout,

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<ApiError> for FetchFailure {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => FetchFailure::Unauthorized,
            other => FetchFailure::Unavailable(other.to_string()),
        }
    }
}

/// Calls made on behalf of a signed-in session.
pub trait SessionApi {
    fn subscription_status(
        &self,
        token: &RawToken,
    ) -> impl Future<Output = Result<SubscriptionStatusResponse, ApiError>>;

    fn admin_profile(
        &self,
        token: &RawToken,
    ) -> impl Future<Output = Result<ProfileResponse, ApiError>>;
}

// ---------------------------------------------------------------------------
// HttpSessionApi
// ---------------------------------------------------------------------------

/// Plain-`http` client over a pooled connector. TLS is left to a local proxy.
#[derive(Clone, Debug)]
pub struct HttpSessionApi {
    client: Client<HttpConnector, Empty<Bytes>>,
    subscription_url: String,
    profile_url: String,
    timeout: Duration,
}

impl HttpSessionApi {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            subscription_url: config.url(&config.subscription_status),
            profile_url: config.url(&config.admin_profile),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, token: &RawToken) -> Result<T, ApiError> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(url)
            .header(AUTHORIZATION, format!("Bearer {}", token.as_str()))
            .header(ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let res = tokio::time::timeout(self.timeout, self.client.request(req))
            .await
            .map_err(|_| ApiError::Timeout)?
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = res.status();
        debug!("GET {} -> {}", url, status);
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let body = tokio::time::timeout(self.timeout, res.into_body().collect())
            .await
            .map_err(|_| ApiError::Timeout)?
            .map_err(|e| ApiError::Transport(e.to_string()))?
            .to_bytes();

        Ok(serde_json::from_slice(&body)?)
    }
}

impl SessionApi for HttpSessionApi {
    async fn subscription_status(
        &self,
        token: &RawToken,
    ) -> Result<SubscriptionStatusResponse, ApiError> {
        self.get_json(&self.subscription_url, token).await
    }

    async fn admin_profile(&self, token: &RawToken) -> Result<ProfileResponse, ApiError> {
        self.get_json(&self.profile_url, token).await
    }
}
