//! Wire format of the edge-visible token cookie.
//!
//! `token=<raw>; Path=/; Max-Age=<ttl>`, cleared by re-sending it with
//! `Max-Age=0`. Both the edge and the client shell format cookies through
//! here so the two views never disagree on shape.

use std::time::Duration;

/// Default cookie name.
pub const TOKEN_COOKIE: &str = "token";

/// `Set-Cookie` value storing `value` for `max_age`.
pub fn set_cookie_value(name: &str, value: &str, max_age: Duration) -> String {
    format!("{}={}; Path=/; Max-Age={}", name, value, max_age.as_secs())
}

/// `Set-Cookie` value that removes the cookie.
pub fn clear_cookie_value(name: &str) -> String {
    format!("{}=; Path=/; Max-Age=0", name)
}

/// Find a cookie by name in a `Cookie:` request header value.
///
/// Empty values are treated as absent; a cleared cookie may linger as
/// `token=` in some clients.
pub fn find_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|cookie| {
        let mut parts = cookie.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}
