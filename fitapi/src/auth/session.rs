//! Session tokens and the cookie that carries them.

use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose};
use rand::prelude::RngExt;
use rand::rng;

use crate::config::SessionConfig;

/// Generate an opaque session token: 32 random bytes, base64url without padding.
pub fn generate_session_token() -> String {
    let mut token_bytes = [0u8; 32];
    rng().fill(&mut token_bytes);

    general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Every non-empty value of cookie `cookie_name` in the request's `Cookie` headers, in the order
/// sent. Browsers send one value per matching `Path`, so a stale cookie can precede a live one.
/// Headers that are not valid visible ASCII are skipped.
pub fn session_tokens_from_headers(headers: &HeaderMap, cookie_name: &str) -> Vec<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .filter(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
        .collect()
}

/// Whether `name` is usable as a cookie name: an RFC 6265 token of visible ASCII with no
/// separators.
pub fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}

/// `Set-Cookie` value establishing a session
pub fn session_cookie(token: &str, config: &SessionConfig) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
        config.cookie_name,
        token,
        same_site(&config.cookie_same_site),
        config.timeout.as_secs()
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that makes the browser drop the session cookie
pub fn cleared_session_cookie(config: &SessionConfig) -> String {
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite={}; Max-Age=0",
        config.cookie_name,
        same_site(&config.cookie_same_site)
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn same_site(value: &str) -> &'static str {
    match value.to_ascii_lowercase().as_str() {
        "strict" => "Strict",
        "none" => "None",
        _ => "Lax",
    }
}
