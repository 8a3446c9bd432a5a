// Authentication boundary for protected routes
use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use log::debug;

use crate::error::AuthError;
use crate::session::cookie::SESSION_COOKIE;
use crate::session::token::{SessionClaims, SessionService};

/// The authenticated principal, extracted from the session cookie.
///
/// Absence of a presentable token is `Unauthenticated`; an expired token is
/// `ExpiredToken`; any other verification failure is downgraded to
/// `Unauthenticated` so protected paths surface 401 with no further detail.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub SessionClaims);

impl FromRequest for AuthenticatedUser {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract(req))
    }
}

fn extract(req: &HttpRequest) -> Result<AuthenticatedUser, AuthError> {
    let sessions = req
        .app_data::<web::Data<SessionService>>()
        .ok_or(AuthError::Unauthenticated)?;

    let cookie = req
        .cookie(SESSION_COOKIE)
        .ok_or(AuthError::Unauthenticated)?;

    match sessions.verify(cookie.value()) {
        Ok(claims) => Ok(AuthenticatedUser(claims)),
        Err(AuthError::ExpiredToken) => Err(AuthError::ExpiredToken),
        Err(e) => {
            debug!("Session verification failed: {e}");
            Err(AuthError::Unauthenticated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::token::SessionIdentity;
    use actix_web::test::TestRequest;

    fn sessions() -> SessionService {
        SessionService::new(b"gate_test_secret".to_vec(), 15, "auth-server-1".to_string())
    }

    fn identity() -> SessionIdentity {
        SessionIdentity {
            subject: "sub-1".to_string(),
            email: "user@example.com".to_string(),
            role: "user".to_string(),
            name: None,
            picture: None,
        }
    }

    #[actix_web::test]
    async fn test_missing_cookie_is_unauthenticated() {
        let req = TestRequest::default()
            .app_data(web::Data::new(sessions()))
            .to_http_request();
        let result = extract(&req);
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[actix_web::test]
    async fn test_valid_cookie_yields_principal() {
        let sessions = sessions();
        let token = sessions.issue(&identity()).unwrap();
        let req = TestRequest::default()
            .app_data(web::Data::new(sessions))
            .cookie(actix_web::cookie::Cookie::new(SESSION_COOKIE, token))
            .to_http_request();
        let user = extract(&req).unwrap();
        assert_eq!(user.0.sub, "sub-1");
        assert_eq!(user.0.role, "user");
    }

    #[actix_web::test]
    async fn test_garbage_cookie_downgraded_to_unauthenticated() {
        let req = TestRequest::default()
            .app_data(web::Data::new(sessions()))
            .cookie(actix_web::cookie::Cookie::new(SESSION_COOKIE, "garbage"))
            .to_http_request();
        assert!(matches!(extract(&req), Err(AuthError::Unauthenticated)));
    }

    #[actix_web::test]
    async fn test_expired_cookie_reported_as_expired() {
        let sessions = sessions();
        let expired =
            SessionService::new(b"gate_test_secret".to_vec(), -1, "auth-server-1".to_string());
        let token = expired.issue(&identity()).unwrap();
        let req = TestRequest::default()
            .app_data(web::Data::new(sessions))
            .cookie(actix_web::cookie::Cookie::new(SESSION_COOKIE, token))
            .to_http_request();
        assert!(matches!(extract(&req), Err(AuthError::ExpiredToken)));
    }
}
