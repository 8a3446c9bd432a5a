// Login endpoints: authorization redirect and provider callback
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use log::{info, warn};
use serde::Deserialize;

use crate::error::AuthError;
use crate::oauth::LoginFlow;
use crate::session::cookie::{
    expired_cookie, login_attempt_cookie, refresh_cookie, session_cookie, CALLBACK_PATH,
    OAUTH_NONCE_COOKIE, OAUTH_STATE_COOKIE,
};
use crate::settings::AuthSettings;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Start a login: mint state and nonce, stash them in callback-scoped
/// cookies and redirect the browser to the provider.
pub async fn authorize(
    flow: web::Data<LoginFlow>,
    settings: web::Data<AuthSettings>,
) -> Result<HttpResponse, AuthError> {
    let start = flow.begin_login()?;
    info!("Redirecting browser to provider for authorization");

    Ok(HttpResponse::Found()
        .append_header((header::LOCATION, start.authorization_url))
        .cookie(login_attempt_cookie(
            OAUTH_STATE_COOKIE,
            &start.state,
            &settings.cookies,
        ))
        .cookie(login_attempt_cookie(
            OAUTH_NONCE_COOKIE,
            &start.nonce,
            &settings.cookies,
        ))
        .finish())
}

/// Complete a login from the provider redirect.
///
/// On success the browser gets the session cookie (plus the refresh-token
/// cookie when the provider issued one), the login attempt cookies are
/// cleared, and the user lands back on the front end.
pub async fn callback(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    flow: web::Data<LoginFlow>,
    settings: web::Data<AuthSettings>,
) -> Result<HttpResponse, AuthError> {
    if let Some(error) = &query.error {
        warn!("Provider returned an authorization error: {error}");
        return Err(AuthError::TokenExchange(format!(
            "provider denied authorization: {error}"
        )));
    }
    let code = query
        .code
        .as_deref()
        .ok_or_else(|| AuthError::MalformedResponse("callback missing code".to_string()))?;
    let presented_state = query
        .state
        .as_deref()
        .ok_or(AuthError::Csrf)?;

    let stored_state = req.cookie(OAUTH_STATE_COOKIE);
    let stored_nonce = req.cookie(OAUTH_NONCE_COOKIE);

    let outcome = flow
        .complete_login(
            code,
            presented_state,
            stored_state.as_ref().map(actix_web::cookie::Cookie::value),
            stored_nonce.as_ref().map(actix_web::cookie::Cookie::value),
        )
        .await?;

    let mut response = HttpResponse::Found();
    response
        .append_header((
            header::LOCATION,
            format!("{}/?login=success", settings.application.frontend_url),
        ))
        .cookie(session_cookie(&outcome.session_token, &settings.cookies))
        .cookie(expired_cookie(
            OAUTH_STATE_COOKIE,
            CALLBACK_PATH,
            &settings.cookies,
        ))
        .cookie(expired_cookie(
            OAUTH_NONCE_COOKIE,
            CALLBACK_PATH,
            &settings.cookies,
        ));

    if let Some(refresh_token) = &outcome.refresh_token {
        response.cookie(refresh_cookie(refresh_token, &settings.cookies));
    }

    Ok(response.finish())
}
