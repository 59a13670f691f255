//! Signed session cookie encoding.
//!
//! # Cookie value format
//!
//! ```text
//! <session-id>.<base64url-no-pad(HMAC-SHA256(secret, session-id))>
//! ```
//!
//! The cookie only ever carries the opaque identifier, never the payload.

use std::time::Duration;

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use cookie::{time, Cookie, SameSite};
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Attributes written on every session `Set-Cookie` header.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub max_age: Duration,
    pub secure: bool,
}

/// Signs and verifies session identifiers with the configured secret.
#[derive(Clone)]
pub struct CookieSigner {
    keyed: HmacSha256,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CookieSigner([REDACTED])")
    }
}

impl CookieSigner {
    /// Key a signer with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLength`] if the MAC rejects the key.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidLength> {
        Ok(Self {
            keyed: HmacSha256::new_from_slice(secret.as_ref())?,
        })
    }

    fn mac(&self) -> HmacSha256 {
        self.keyed.clone()
    }

    /// Produce the cookie value for `session_id`.
    pub fn sign(&self, session_id: &str) -> String {
        let mut mac = self.mac();
        mac.update(session_id.as_bytes());
        let tag = mac.finalize().into_bytes();
        format!("{session_id}.{}", URL_SAFE_NO_PAD.encode(tag))
    }

    /// Return the session id carried by `value` if its signature is valid.
    ///
    /// The tag comparison is constant-time.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (id, tag) = value.rsplit_once('.')?;
        if id.is_empty() {
            return None;
        }
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        let mut mac = self.mac();
        mac.update(id.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(id.to_owned())
    }
}

/// Find the value of cookie `name` in the request's `Cookie` headers.
/// Malformed pairs are skipped and surrounding double quotes are dropped.
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value_trimmed().to_owned())
}

/// Render a `Set-Cookie` value issuing `value` for `settings.max_age`.
pub fn format_set_cookie(settings: &CookieSettings, value: &str) -> String {
    let max_age = i64::try_from(settings.max_age.as_secs()).unwrap_or(i64::MAX);
    session_cookie(settings, value.to_owned(), time::Duration::seconds(max_age))
}

/// Render a `Set-Cookie` value that removes the session cookie.
pub fn format_clear_cookie(settings: &CookieSettings) -> String {
    session_cookie(settings, String::new(), time::Duration::ZERO)
}

fn session_cookie(settings: &CookieSettings, value: String, max_age: time::Duration) -> String {
    Cookie::build((settings.name.clone(), value))
        .path("/")
        .max_age(max_age)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure)
        .build()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn settings() -> CookieSettings {
        CookieSettings {
            name: "sid".into(),
            max_age: Duration::from_secs(15 * 24 * 60 * 60),
            secure: false,
        }
    }

    #[test]
    fn sign_then_verify() {
        let signer = CookieSigner::new("keyboard cat").unwrap();
        let value = signer.sign("abc123");
        assert!(value.starts_with("abc123."));
        assert_eq!(signer.verify(&value).as_deref(), Some("abc123"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let value = CookieSigner::new("secret-a").unwrap().sign("abc123");
        assert!(CookieSigner::new("secret-b").unwrap().verify(&value).is_none());
    }

    #[test]
    fn tampered_id_is_rejected() {
        let signer = CookieSigner::new("keyboard cat").unwrap();
        let value = signer.sign("abc123");
        let forged = value.replacen("abc123", "abc124", 1);
        assert!(signer.verify(&forged).is_none());
    }

    #[test]
    fn unsigned_values_are_rejected() {
        let signer = CookieSigner::new("keyboard cat").unwrap();
        assert!(signer.verify("abc123").is_none());
        assert!(signer.verify(".abc").is_none());
        assert!(signer.verify("abc123.!!!").is_none());
    }

    #[test]
    fn find_cookie_among_several() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sid=abc.def; lang=en"),
        );
        assert_eq!(find_cookie(&headers, "sid").as_deref(), Some("abc.def"));
        assert_eq!(find_cookie(&headers, "missing"), None);
    }

    #[test]
    fn find_cookie_across_headers_and_quotes() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; broken"));
        headers.append(header::COOKIE, HeaderValue::from_static("sid=\"abc.def\""));
        assert_eq!(find_cookie(&headers, "sid").as_deref(), Some("abc.def"));
    }

    fn attributes(set_cookie: &str) -> Vec<String> {
        let mut parts: Vec<String> = set_cookie.split("; ").map(str::to_owned).collect();
        parts[1..].sort();
        parts
    }

    #[test]
    fn set_cookie_attributes() {
        let cookie = format_set_cookie(&settings(), "abc.def");
        assert_eq!(
            attributes(&cookie),
            [
                "sid=abc.def",
                "HttpOnly",
                "Max-Age=1296000",
                "Path=/",
                "SameSite=Lax",
            ]
        );
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = format_clear_cookie(&CookieSettings {
            secure: true,
            ..settings()
        });
        assert_eq!(
            attributes(&cookie),
            [
                "sid=",
                "HttpOnly",
                "Max-Age=0",
                "Path=/",
                "SameSite=Lax",
                "Secure",
            ]
        );
    }

    #[test]
    fn issued_cookie_parses_back() {
        let issued = format_set_cookie(&settings(), "abc.def");
        let parsed = Cookie::parse(issued).unwrap();
        assert_eq!(parsed.value(), "abc.def");
        assert_eq!(parsed.max_age(), Some(time::Duration::seconds(1_296_000)));
        assert_eq!(parsed.same_site(), Some(SameSite::Lax));
        assert_eq!(parsed.http_only(), Some(true));
    }
}
