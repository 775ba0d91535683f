//! Cookie-based identity assignment.
//!
//! Every request carries a [`UserId`] in its extensions. A caller presenting
//! a well-formed `sideload_uid` cookie keeps that identity; anyone else gets
//! a fresh one and a `Set-Cookie` header on the response. Identities are
//! bearer tokens with no authentication behind them.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use sideload_core::identity::UserId;

/// Name of the cookie holding the caller's identity.
pub const IDENTITY_COOKIE: &str = "sideload_uid";

/// One year, in seconds.
const COOKIE_MAX_AGE: u64 = 365 * 24 * 60 * 60;

/// Resolves the caller's identity and exposes it to handlers.
pub async fn assign_identity(mut req: Request, next: Next) -> Response {
    let (user, issued) = match presented_identity(req.headers()) {
        Some(user) => (user, false),
        None => {
            let user = UserId::generate();
            tracing::info!("Generated new user ID: {}", user);
            (user, true)
        }
    };

    req.extensions_mut().insert(user.clone());
    let mut response = next.run(req).await;

    if issued {
        match HeaderValue::from_str(&identity_cookie(&user)) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Failed to build identity cookie: {}", e),
        }
    }

    response
}

/// Returns the identity from the `Cookie` headers, if present and well formed.
pub fn presented_identity(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == IDENTITY_COOKIE)
        .and_then(|(_, value)| UserId::parse(value.trim()))
}

/// Renders the `Set-Cookie` value for a newly issued identity.
pub fn identity_cookie(user: &UserId) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Strict; Path=/; Max-Age={}",
        IDENTITY_COOKIE, user, COOKIE_MAX_AGE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_presented_identity_found_among_other_cookies() {
        let user = UserId::generate();
        let map = headers(&format!("theme=dark; {}={}; lang=en", IDENTITY_COOKIE, user));
        assert_eq!(presented_identity(&map), Some(user));
    }

    #[test]
    fn test_malformed_identity_is_ignored() {
        assert_eq!(presented_identity(&headers("sideload_uid=../../etc")), None);
        assert_eq!(presented_identity(&headers("sideload_uid=")), None);
        assert_eq!(presented_identity(&HeaderMap::new()), None);
    }

    #[test]
    fn test_identity_cookie_attributes() {
        let user = UserId::generate();
        let cookie = identity_cookie(&user);
        assert!(cookie.starts_with(&format!("sideload_uid={};", user)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=31536000"));
    }
}
