//! First-touch referral stamping.
//!
//! A visitor arriving with `?ref=<code>` gets a `referral_code` cookie unless
//! they already carry one, or already carry a resolved `referrer_id`. The
//! cookie is read back when a magic link creates the visitor's account.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

pub const REFERRAL_CODE_COOKIE: &str = "referral_code";
pub const REFERRER_ID_COOKIE: &str = "referrer_id";
pub const ATTRIBUTION_COOKIE_MAX_AGE: Duration = Duration::days(30);

/// Leading path segments the stamping never runs on.
const EXCLUDED_PREFIXES: &[&str] = &[
    "api",
    "static",
    "_next/static",
    "_next/image",
    "favicon.ico",
    "sitemap.xml",
    "robots.txt",
    ".well-known",
];

/// First value of `key` in a raw query string. Later repeats are ignored.
pub fn first_query_value(query: Option<&str>, key: &str) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

pub fn attribution_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(ATTRIBUTION_COOKIE_MAX_AGE)
        .build()
}

pub fn is_attribution_path(path: &str) -> bool {
    let path = path.trim_start_matches('/');
    !EXCLUDED_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

pub async fn referral_attribution(jar: CookieJar, request: Request, next: Next) -> Response {
    if !is_attribution_path(request.uri().path()) {
        return next.run(request).await;
    }

    let code = first_query_value(request.uri().query(), "ref").filter(|code| !code.is_empty());

    let already_attributed =
        jar.get(REFERRAL_CODE_COOKIE).is_some() || jar.get(REFERRER_ID_COOKIE).is_some();

    let response = next.run(request).await;

    match code {
        Some(code) if !already_attributed => {
            tracing::debug!("Stamping first-touch referral code {}", code);
            (jar.add(attribution_cookie(REFERRAL_CODE_COOKIE, code)), response).into_response()
        }
        _ => response,
    }
}
