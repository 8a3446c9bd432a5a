// Protected endpoints gated by the session extractor
use actix_web::HttpResponse;
use serde_json::json;

use crate::session::AuthenticatedUser;

/// Return the authenticated user's profile from the session claims.
pub async fn me(user: AuthenticatedUser) -> HttpResponse {
    let claims = user.0;
    HttpResponse::Ok().json(json!({
        "sub": claims.sub,
        "email": claims.email,
        "role": claims.role,
        "name": claims.name,
        "picture": claims.picture,
    }))
}

/// A sample route that requires a valid session.
pub async fn protected(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": format!("Hello, {}! This route requires a valid session.", user.0.email),
    }))
}
