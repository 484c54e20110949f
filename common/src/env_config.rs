use std::{env, sync::Arc};

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// This struct holds all the necessary configuration parameters
/// required to initialize and run the server: database and Redis
/// connection details, JWT configuration, server host and port,
/// number of worker threads, CORS settings, logging preferences,
/// identity provider settings, the extraction provider and quota limits.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// The URL of a Redis server. When set, guest quotas are shared through Redis.
    pub redis_url: Option<String>,
    /// Configuration for JWT (JSON Web Token) authentication.
    pub jwt_config: JwtConfig,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// Allowed origins for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origins: Vec<String>,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// Identity providers used to verify sign-in credentials.
    pub identity: IdentityConfig,
    /// Configuration of the AI table extraction provider.
    pub gemini: GeminiConfig,
    /// Daily extraction quotas.
    pub quota: QuotaConfig,
    /// Per-IP request rate limit applied to the whole API.
    pub rate_limit: RateLimitConfig,
}

#[derive(Clone, Debug)]
/// Configuration for JSON Web Token (JWT) authentication.
///
/// This struct contains the secret key used to sign JWTs and
/// the expiration time in hours for issued tokens.
pub struct JwtConfig {
    /// The secret key used to sign and verify JWTs.
    pub secret: String,
    /// The expiration time for JWTs in hours.
    pub expiration_hours: i64,
}

#[derive(Clone, Debug)]
/// Audiences accepted when verifying Google and Firebase ID tokens.
pub struct IdentityConfig {
    /// OAuth client ID of the web application (audience of Google ID tokens).
    pub google_client_id: String,
    /// Firebase project ID (audience of Firebase ID tokens issued to the mobile app).
    pub firebase_project_id: String,
}

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// Base URL of the Generative Language API.
    pub api_url: String,
}

#[derive(Clone, Debug)]
pub struct QuotaConfig {
    /// Extractions per 24h window for signed-in users without premium.
    pub free_daily_limit: i64,
    /// Extractions per 24h window for anonymous callers, per client IP.
    pub guest_daily_limit: i64,
    /// How often stale guest entries are evicted from memory.
    pub guest_sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl JwtConfig {
    /// Creates a new `JwtConfig` instance from environment variables.
    ///
    /// Reads the JWT configuration from environment variables:
    /// - `JWT_SECRET`: Required. The secret key for JWT signing.
    /// - `JWT_EXPIRATION_HOURS`: Optional. Defaults to 168 hours (7 days) if not provided.
    ///
    /// # Panics
    ///
    /// This function will panic if:
    /// - `JWT_SECRET` environment variable is not set
    /// - `JWT_EXPIRATION_HOURS` is set but cannot be parsed as a valid number
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        JwtConfig {
            secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "168".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a valid number"),
        }
    }
}

impl QuotaConfig {
    pub fn from_env() -> Self {
        QuotaConfig {
            free_daily_limit: parse_or("FREE_DAILY_EXTRACTIONS", 5),
            guest_daily_limit: parse_or("GUEST_DAILY_EXTRACTIONS", 3),
            guest_sweep_interval_secs: parse_or("GUEST_SWEEP_INTERVAL_SECS", 3600),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        QuotaConfig {
            free_daily_limit: 5,
            guest_daily_limit: 3,
            guest_sweep_interval_secs: 3600,
        }
    }
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `DATABASE_URL`: Connection string for the database
    /// - `JWT_SECRET`: Secret key for JWT signing (via `JwtConfig::from_env()`)
    ///
    /// Optional (with defaults):
    /// - `ENVIRONMENT`: "development" or "production" (default: "development")
    /// - `REDIS_URL`: Redis server for shared guest quotas (default: unset, in-process quotas)
    /// - `IP`: Server host (default: "127.0.0.1")
    /// - `PORT`: Server port (default: 3000)
    /// - `WORKERS`: Number of worker threads (default: 4)
    /// - `CORS_ALLOWED_ORIGINS`: Comma separated origins (default: local dev servers)
    /// - `ENABLE_CONSOLE_LOGGING`: Whether to enable console logging (default: true)
    /// - `GOOGLE_CLIENT_ID`, `FIREBASE_PROJECT_ID`: token audiences
    /// - `GEMINI_API_KEY`, `GEMINI_MODEL`, `GEMINI_API_URL`: extraction provider
    /// - `FREE_DAILY_EXTRACTIONS` (5), `GUEST_DAILY_EXTRACTIONS` (3),
    ///   `GUEST_SWEEP_INTERVAL_SECS` (3600)
    /// - `RATE_LIMIT_WINDOW_SECS` (900), `RATE_LIMIT_MAX_REQUESTS` (100)
    ///
    /// # Panics
    ///
    /// This function will panic if required environment variables are missing.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| {
                "http://localhost:5173,http://localhost:3000,http://localhost:3001".to_string()
            })
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            jwt_config: JwtConfig::from_env(),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: parse_or("PORT", 3000),
            num_workers: parse_or("WORKERS", 4),
            cors_allowed_origins,
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            identity: IdentityConfig {
                google_client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
                firebase_project_id: env::var("FIREBASE_PROJECT_ID")
                    .unwrap_or_else(|_| "image2sheets".to_string()),
            },
            gemini: GeminiConfig {
                api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
                model: env::var("GEMINI_MODEL")
                    .unwrap_or_else(|_| "gemini-2.5-flash-lite".to_string()),
                api_url: env::var("GEMINI_API_URL").unwrap_or_else(|_| {
                    "https://generativelanguage.googleapis.com/v1beta".to_string()
                }),
            },
            quota: QuotaConfig::from_env(),
            rate_limit: RateLimitConfig {
                window_secs: parse_or("RATE_LIMIT_WINDOW_SECS", 900),
                max_requests: parse_or("RATE_LIMIT_MAX_REQUESTS", 100),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
