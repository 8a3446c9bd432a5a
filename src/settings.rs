use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthSettings {
    pub application: ApplicationSettings,
    pub provider: ProviderSettings,
    pub jwt: JwtSettings,
    pub encryption: EncryptionSettings,
    pub cookies: CookieSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Public base URL of this service; the provider redirects back to
    /// `{base_url}/oauth2/callback`.
    pub base_url: String,
    /// Front-end origin the callback redirects to after a successful login.
    pub frontend_url: String,
    pub cors_origins: String,
}

/// The single identity provider this service targets (Google).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub certs_url: String,
    pub issuer: String,
    pub scopes: String,
    /// Bound on every provider network call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How long fetched signing keys stay fresh, in seconds.
    #[serde(default = "default_jwks_cache")]
    pub jwks_cache_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    /// HMAC secret for session tokens. Generated (with a warning) if empty.
    pub secret: String,
    /// Session token lifetime. Kept short: there is no revocation store.
    pub expire_minutes: i64,
    /// Key identifier stamped into issued tokens for future rotation support.
    pub key_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionSettings {
    /// Base64 (standard alphabet) AES-256 key for refresh tokens at rest.
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieSettings {
    pub secure: bool,
    pub same_site: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

fn default_request_timeout() -> u64 {
    10
}
fn default_jwks_cache() -> u64 {
    3600
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            cors_origins: "http://localhost:5173".to_string(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            certs_url: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
            issuer: "https://accounts.google.com".to_string(),
            scopes: "openid email profile".to_string(),
            request_timeout_secs: default_request_timeout(),
            jwks_cache_secs: default_jwks_cache(),
        }
    }
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expire_minutes: 15,
            key_id: "auth-server-1".to_string(),
        }
    }
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self { key: String::new() }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: "lax".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AuthSettings {
    /// Load settings from Settings.toml and environment variables.
    ///
    /// This also loads a `.env` file if present and initializes the logger.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();
        let _ = env_logger::try_init();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Ok(settings)
    }

    /// Load base settings from Settings.toml in the current directory, or
    /// fall back to defaults.
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = std::path::PathBuf::from("Settings.toml");
        if config_path.exists() {
            let toml_content = fs::read_to_string(&config_path)?;
            let settings = basic_toml::from_str(&toml_content)?;
            println!("✓ Loaded base settings from {}", config_path.display());
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_provider_env_overrides(&mut settings.provider);
        Self::apply_jwt_env_overrides(&mut settings.jwt);
        Self::apply_encryption_env_overrides(&mut settings.encryption);
        Self::apply_cookie_env_overrides(&mut settings.cookies);
        if let Ok(level) = std::env::var("RUST_LOG") {
            settings.logging.level = level;
        }
    }

    fn apply_application_env_overrides(app: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app.port = port;
            }
        }
        if let Ok(base_url) = std::env::var("BASE_URL") {
            app.base_url = base_url;
        }
        if let Ok(frontend_url) = std::env::var("FRONTEND_URL") {
            app.frontend_url = frontend_url;
        }
        if let Ok(cors_origins) = std::env::var("CORS_ORIGINS") {
            app.cors_origins = cors_origins;
        }
    }

    fn apply_provider_env_overrides(provider: &mut ProviderSettings) {
        if let Ok(client_id) = std::env::var("GOOGLE_CLIENT_ID") {
            provider.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("GOOGLE_CLIENT_SECRET") {
            provider.client_secret = client_secret;
        }
        if let Ok(auth_url) = std::env::var("GOOGLE_AUTH_URL") {
            provider.auth_url = auth_url;
        }
        if let Ok(token_url) = std::env::var("GOOGLE_TOKEN_URL") {
            provider.token_url = token_url;
        }
        if let Ok(certs_url) = std::env::var("GOOGLE_CERTS_URL") {
            provider.certs_url = certs_url;
        }
    }

    fn apply_jwt_env_overrides(jwt: &mut JwtSettings) {
        let env_secret_set = std::env::var("JWT_SECRET").is_ok_and(|secret| {
            if secret.is_empty() {
                false
            } else {
                jwt.secret = secret;
                true
            }
        });
        if !env_secret_set && jwt.secret.is_empty() {
            jwt.secret = Self::generate_random_secret();
            eprintln!("⚠️  WARNING: Using auto-generated JWT secret");
            eprintln!("   Sessions will not survive a restart; set JWT_SECRET for production");
        }
        if let Ok(minutes_str) = std::env::var("JWT_EXPIRE_MINUTES") {
            if let Ok(minutes) = minutes_str.parse::<i64>() {
                jwt.expire_minutes = minutes;
            }
        }
    }

    fn apply_encryption_env_overrides(encryption: &mut EncryptionSettings) {
        let env_key_set = std::env::var("ENCRYPTION_KEY").is_ok_and(|key| {
            if key.is_empty() {
                false
            } else {
                encryption.key = key;
                true
            }
        });
        if !env_key_set && encryption.key.is_empty() {
            encryption.key = Self::generate_random_secret();
            eprintln!("⚠️  WARNING: Using auto-generated refresh-token encryption key");
            eprintln!("   Stored credentials will not survive a restart; set ENCRYPTION_KEY");
        }
    }

    fn apply_cookie_env_overrides(cookies: &mut CookieSettings) {
        if let Ok(secure_str) = std::env::var("COOKIE_SECURE") {
            if let Ok(secure) = secure_str.parse::<bool>() {
                cookies.secure = secure;
            }
        }
        if let Ok(same_site) = std::env::var("COOKIE_SAMESITE") {
            cookies.same_site = same_site;
        }
    }

    /// Generate a 256-bit secret from the OS CSPRNG, base64 encoded.
    fn generate_random_secret() -> String {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        general_purpose::STANDARD.encode(secret)
    }

    /// Load environment variables from a `.env` file if one exists.
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        self.application
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .collect()
    }

    /// The callback URL registered with the provider.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}/oauth2/callback", self.application.base_url)
    }

    /// Decode the configured refresh-token encryption key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not valid base64 or not exactly 32 bytes.
    pub fn encryption_key(&self) -> anyhow::Result<[u8; 32]> {
        let decoded = general_purpose::STANDARD
            .decode(&self.encryption.key)
            .map_err(|e| anyhow::anyhow!("ENCRYPTION_KEY is not valid base64: {e}"))?;
        let key: [u8; 32] = decoded
            .try_into()
            .map_err(|_| anyhow::anyhow!("ENCRYPTION_KEY must decode to exactly 32 bytes"))?;
        Ok(key)
    }
}
