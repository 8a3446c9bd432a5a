#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use authgate::{
    handlers::{auth, health, user},
    utils::crypto::RefreshTokenCipher,
    AuthSettings, IdTokenVerifier, KeyResolver, LoginFlow, MemoryUserStore, SessionService,
    UserStore,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = AuthSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let encryption_key = settings
        .encryption_key()
        .map_err(|e| std::io::Error::other(format!("Invalid encryption key: {e}")))?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.provider.request_timeout_secs))
        .build()
        .map_err(|e| std::io::Error::other(format!("Failed to build HTTP client: {e}")))?;

    let keys = KeyResolver::new(
        settings.provider.certs_url.clone(),
        http.clone(),
        Duration::from_secs(settings.provider.jwks_cache_secs),
    );
    let verifier = IdTokenVerifier::new(
        keys,
        settings.provider.client_id.clone(),
        settings.provider.issuer.clone(),
    );
    let sessions = SessionService::new(
        settings.jwt.secret.clone().into_bytes(),
        settings.jwt.expire_minutes,
        settings.jwt.key_id.clone(),
    );
    let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
    let flow = LoginFlow::new(
        settings.provider.clone(),
        settings.redirect_uri(),
        http,
        verifier,
        RefreshTokenCipher::new(encryption_key),
        store,
        sessions.clone(),
    );

    start_server(settings, flow, sessions).await
}

/// Start the server.
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    settings: AuthSettings,
    flow: LoginFlow,
    sessions: SessionService,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    // Configure CORS for the front end
    let cors_origins = settings.get_cors_origins();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Authorization", "Content-Type", "Accept"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(settings.clone()))
            .app_data(web::Data::new(flow.clone()))
            .app_data(web::Data::new(sessions.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg
        // Login flow
        .route("/oauth/authorize", web::get().to(auth::authorize))
        .route("/oauth2/callback", web::get().to(auth::callback))
        // Protected API
        .route("/api/me", web::get().to(user::me))
        .route("/api/protected", web::get().to(user::protected))
        // Health endpoint
        .route("/health", web::get().to(health::health));
}

fn print_startup_info(bind_address: &str, settings: &AuthSettings) {
    println!("🔐 Authgate starting on {bind_address}");
    println!("   Provider:     {}", settings.provider.issuer);
    println!("   Callback:     {}", settings.redirect_uri());
    println!("   Front end:    {}", settings.application.frontend_url);
    println!(
        "   Session TTL:  {} minutes",
        settings.jwt.expire_minutes
    );
}
