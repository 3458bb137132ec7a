use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Minimum length of the JWT signing secret in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// development | production
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:./data/storefront.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret for admin session tokens. Required.
    #[serde(default)]
    pub jwt_secret: String,
    /// Lifetime of an admin session token (default: 120 minutes)
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
    /// Bootstrap super admin, created only when no admin exists yet
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_minutes: default_token_ttl_minutes(),
            admin_email: default_admin_email(),
            admin_password: default_admin_password(),
        }
    }
}

fn default_token_ttl_minutes() -> i64 {
    120
}

fn default_admin_email() -> String {
    "admin@storefront.local".to_string()
}

fn default_admin_password() -> String {
    "admin123".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Custom S3-compatible endpoint (e.g. MinIO). None uses AWS.
    pub endpoint: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Static credentials. When absent the default AWS provider chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Base URL for public object links. Supports `{bucket}` and `{key}` templating.
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: default_bucket(),
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            public_base_url: None,
        }
    }
}

fn default_bucket() -> String {
    "storefront-images".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl StorageConfig {
    /// Base URL that public image links are built from
    pub fn public_base(&self) -> String {
        if let Some(base) = &self.public_base_url {
            return base.clone();
        }
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.s3.amazonaws.com", self.bucket),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Simulated gateway round-trip of the mock payment processor
    #[serde(default = "default_simulated_latency_ms")]
    pub simulated_latency_ms: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            simulated_latency_ms: default_simulated_latency_ms(),
        }
    }
}

fn default_simulated_latency_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; "*" allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from an optional TOML file, then apply environment
    /// overrides and validate the result.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Apply environment variable overrides using the given lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("SERVER_PORT").or_else(|| var("PORT")) {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid server port: {}", port))?;
        }
        if let Some(env) = var("SERVER_ENVIRONMENT") {
            self.server.environment = env;
        }

        if let Some(url) = var("DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(secret) = var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(ttl) = var("TOKEN_TTL_MINUTES") {
            self.auth.token_ttl_minutes = ttl
                .parse()
                .with_context(|| format!("Invalid token TTL: {}", ttl))?;
        }
        if let Some(email) = var("ADMIN_DEFAULT_EMAIL") {
            self.auth.admin_email = email;
        }
        if let Some(password) = var("ADMIN_DEFAULT_PASSWORD") {
            self.auth.admin_password = password;
        }

        if let Some(endpoint) = var("S3_ENDPOINT") {
            self.storage.endpoint = Some(endpoint);
        }
        if let Some(bucket) = var("S3_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Some(region) = var("S3_REGION") {
            self.storage.region = region;
        }
        if let Some(key) = var("S3_ACCESS_KEY_ID") {
            self.storage.access_key_id = Some(key);
        }
        if let Some(secret) = var("S3_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Some(secret);
        }
        if let Some(base) = var("S3_PUBLIC_BASE_URL") {
            self.storage.public_base_url = Some(base);
        }

        if let Some(latency) = var("PAYMENT_LATENCY_MS") {
            self.payment.simulated_latency_ms = latency
                .parse()
                .with_context(|| format!("Invalid payment latency: {}", latency))?;
        }

        if let Some(origins) = var("CORS_ALLOWED_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Reject configurations the server must not start with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            bail!("JWT secret is not configured (set auth.jwt_secret or JWT_SECRET)");
        }
        if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            bail!(
                "JWT secret must be at least {} bytes long",
                MIN_JWT_SECRET_LEN
            );
        }
        if self.auth.token_ttl_minutes <= 0 {
            bail!("Token TTL must be positive");
        }
        if self.storage.bucket.trim().is_empty() {
            bail!("Object storage bucket name is required");
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.token_ttl_minutes, 120);
        assert_eq!(config.payment.simulated_latency_ms, 2000);
        assert_eq!(config.storage.region, "us-east-1");
        assert!(!config.is_production());
    }

    #[test]
    fn test_parse_toml_sections() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000
            environment = "production"

            [auth]
            jwt_secret = "0123456789abcdef0123456789abcdef"

            [storage]
            endpoint = "http://localhost:9000"
            bucket = "images"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert!(config.is_production());
        assert_eq!(config.storage.bucket, "images");
        // Unspecified sections fall back to defaults
        assert_eq!(config.database.max_connections, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "3000"),
            ("JWT_SECRET", SECRET),
            ("S3_BUCKET", "shop"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("ADMIN_DEFAULT_EMAIL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.jwt_secret, SECRET);
        assert_eq!(config.storage.bucket, "shop");
        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        // Empty values are ignored
        assert_eq!(config.auth.admin_email, "admin@storefront.local");
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = Config::default();
        let result = config.apply_env_overrides(|k| (k == "SERVER_PORT").then(|| "http".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_missing_or_short_secret() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());

        config.auth.jwt_secret = SECRET.to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_public_base() {
        let mut storage = StorageConfig::default();
        assert_eq!(
            storage.public_base(),
            "https://storefront-images.s3.amazonaws.com"
        );

        storage.endpoint = Some("http://localhost:9000/".to_string());
        assert_eq!(storage.public_base(), "http://localhost:9000");

        storage.public_base_url = Some("https://cdn.example.com".to_string());
        assert_eq!(storage.public_base(), "https://cdn.example.com");
    }
}
