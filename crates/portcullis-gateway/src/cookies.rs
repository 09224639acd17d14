//! Session cookie helpers

use axum::http::{header::COOKIE, HeaderMap};
use cookie::{time::Duration, Cookie, SameSite};

/// `Set-Cookie` value carrying a session artifact
pub fn session_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    Cookie::build((name.to_string(), value.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(i64::try_from(max_age_secs).unwrap_or(i64::MAX)))
        .build()
        .to_string()
}

/// `Set-Cookie` value that deletes the session cookie
pub fn expired_session_cookie(name: &str, secure: bool) -> String {
    Cookie::build((name.to_string(), String::new()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::ZERO)
        .build()
        .to_string()
}

/// Read a cookie value from request headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value).flatten())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("session", "abc.def.ghi", 604_800, true);

        assert!(cookie.starts_with("session=abc.def.ghi"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=604800"));
    }

    #[test]
    fn test_not_secure_outside_production() {
        let cookie = session_cookie("session", "v", 60, false);
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_expired_cookie() {
        let cookie = expired_session_cookie("session", false);
        assert!(cookie.starts_with("session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; session=a.b.c"));
        headers.append(COOKIE, HeaderValue::from_static("other=1"));

        assert_eq!(read_cookie(&headers, "session").as_deref(), Some("a.b.c"));
        assert_eq!(read_cookie(&headers, "other").as_deref(), Some("1"));
        assert!(read_cookie(&headers, "missing").is_none());
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session="));
        assert!(read_cookie(&headers, "session").is_none());
    }
}
