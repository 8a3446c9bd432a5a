// Cookie construction for the login flow and session credential
use actix_web::cookie::{time::Duration, Cookie, SameSite};

use crate::settings::CookieSettings;

/// Cookie names used across the application
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub const OAUTH_NONCE_COOKIE: &str = "oauth_nonce";
pub const SESSION_COOKIE: &str = "session_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Path the state/nonce cookies are scoped to, so they are only presented
/// back on the callback request.
pub const CALLBACK_PATH: &str = "/oauth2/callback";

/// State/nonce cookie lifetime: the login attempt must complete within this.
const STATE_TTL_SECONDS: i64 = 600;

/// Refresh-token cookie lifetime (30 days).
const REFRESH_TTL_SECONDS: i64 = 60 * 60 * 24 * 30;

fn same_site(settings: &CookieSettings) -> SameSite {
    match settings.same_site.to_ascii_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    }
}

/// Short-lived, callback-scoped cookie holding the `state` or `nonce` value.
#[must_use]
pub fn login_attempt_cookie<'a>(
    name: &'a str,
    value: &'a str,
    settings: &CookieSettings,
) -> Cookie<'a> {
    Cookie::build(name, value)
        .http_only(true)
        .secure(settings.secure)
        .same_site(same_site(settings))
        .path(CALLBACK_PATH)
        .max_age(Duration::seconds(STATE_TTL_SECONDS))
        .finish()
}

/// The session credential cookie. No max-age: it lives for the browser
/// session, and the token inside carries its own (shorter) expiry.
#[must_use]
pub fn session_cookie<'a>(token: &'a str, settings: &CookieSettings) -> Cookie<'a> {
    Cookie::build(SESSION_COOKIE, token)
        .http_only(true)
        .secure(settings.secure)
        .same_site(same_site(settings))
        .path("/")
        .finish()
}

/// Long-lived cookie carrying the provider refresh token, set only when the
/// provider issued one.
#[must_use]
pub fn refresh_cookie<'a>(token: &'a str, settings: &CookieSettings) -> Cookie<'a> {
    Cookie::build(REFRESH_COOKIE, token)
        .http_only(true)
        .secure(settings.secure)
        .same_site(same_site(settings))
        .path("/")
        .max_age(Duration::seconds(REFRESH_TTL_SECONDS))
        .finish()
}

/// An expired cookie that instructs the browser to discard `name`.
#[must_use]
pub fn expired_cookie<'a>(name: &'a str, path: &'a str, settings: &CookieSettings) -> Cookie<'a> {
    Cookie::build(name, "")
        .http_only(true)
        .secure(settings.secure)
        .same_site(same_site(settings))
        .path(path)
        .max_age(Duration::ZERO)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CookieSettings {
        CookieSettings {
            secure: true,
            same_site: "lax".to_string(),
        }
    }

    #[test]
    fn test_login_attempt_cookie_is_scoped_and_short_lived() {
        let cookie = login_attempt_cookie(OAUTH_STATE_COOKIE, "state-value", &settings());
        assert_eq!(cookie.name(), "oauth_state");
        assert_eq!(cookie.path(), Some(CALLBACK_PATH));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(600)));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
    }

    #[test]
    fn test_session_cookie_has_browser_session_lifetime() {
        let cookie = session_cookie("jwt-value", &settings());
        assert_eq!(cookie.name(), "session_token");
        assert_eq!(cookie.max_age(), None);
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[test]
    fn test_refresh_cookie_lives_thirty_days() {
        let cookie = refresh_cookie("refresh-value", &settings());
        assert_eq!(cookie.max_age(), Some(Duration::days(30)));
    }

    #[test]
    fn test_expired_cookie_clears_value() {
        let cookie = expired_cookie(OAUTH_NONCE_COOKIE, CALLBACK_PATH, &settings());
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }

    #[test]
    fn test_same_site_parsing() {
        let mut s = settings();
        s.same_site = "strict".to_string();
        assert_eq!(
            login_attempt_cookie("n", "v", &s).same_site(),
            Some(SameSite::Strict)
        );
        s.same_site = "unknown".to_string();
        assert_eq!(
            login_attempt_cookie("n", "v", &s).same_site(),
            Some(SameSite::Lax)
        );
    }
}
