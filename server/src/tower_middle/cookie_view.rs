use std::sync::Mutex;
use std::time::Duration;

use hyper::header::HeaderMap;
use tracing::debug;

use shared::access::cookie::{clear_cookie_value, set_cookie_value};
use shared::access::{RawToken, StoreError, TokenSlot};

use crate::handlers::utils::get_cookie;

/// The request's cookie jar seen as a [`TokenSlot`].
///
/// Reads come from the `Cookie` request header; writes are queued as
/// `Set-Cookie` values for the response.
#[derive(Debug)]
pub struct CookieView {
    name: String,
    current: Option<RawToken>,
    pending: Mutex<Vec<String>>,
}

impl CookieView {
    pub fn from_headers(headers: &HeaderMap, name: &str) -> Self {
        Self {
            name: name.to_string(),
            current: get_cookie(headers, name).map(RawToken::new),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Drain the queued `Set-Cookie` values.
    pub fn take_set_cookies(&self) -> Vec<String> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => Vec::new(),
        }
    }

    fn queue(&self, value: String) -> Result<(), StoreError> {
        self.pending
            .lock()
            .map_err(|_| StoreError::Corrupt("cookie view lock poisoned".into()))?
            .push(value);
        Ok(())
    }
}

impl TokenSlot for CookieView {
    fn load(&self) -> Result<Option<RawToken>, StoreError> {
        Ok(self.current.clone())
    }

    fn save(&self, token: &RawToken, ttl: Duration) -> Result<(), StoreError> {
        debug!("Queueing cookie {} for {}s", self.name, ttl.as_secs());
        self.queue(set_cookie_value(&self.name, token.as_str(), ttl))
    }

    fn remove(&self) -> Result<(), StoreError> {
        debug!("Queueing removal of cookie {}", self.name);
        self.queue(clear_cookie_value(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn loads_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("a=1; token=x.y.z"));
        let view = CookieView::from_headers(&headers, "token");
        assert_eq!(view.load().unwrap(), Some(RawToken::new("x.y.z")));
    }

    #[test]
    fn writes_become_set_cookie_values() {
        let view = CookieView::from_headers(&HeaderMap::new(), "token");
        assert_eq!(view.load().unwrap(), None);

        view.save(&RawToken::new("t"), Duration::from_secs(30)).unwrap();
        view.remove().unwrap();
        assert_eq!(
            view.take_set_cookies(),
            vec![
                "token=t; Path=/; Max-Age=30".to_string(),
                "token=; Path=/; Max-Age=0".to_string(),
            ]
        );
        assert!(view.take_set_cookies().is_empty());
    }
}
