/// Configuration management for the moderation subsystem
use crate::error::{ModError, ModResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main moderation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub anonymity: AnonymityConfig,
    pub listing: ListingConfig,
    pub logging: LoggingConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Credential configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Lifetime of issued access tokens in seconds
    pub token_ttl_seconds: i64,
    /// Clock skew tolerated when checking expiry
    pub leeway_seconds: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

/// Anonymous category presentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymityConfig {
    /// Reserved username of the synthetic anonymous account
    pub handle: String,
    /// Name shown in place of the real author
    pub display_name: String,
}

/// Pagination defaults for listing operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Development diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Attach internal error detail to responses. Development only.
    pub expose_internal_errors: bool,
}

impl Default for AnonymityConfig {
    fn default() -> Self {
        Self {
            handle: "anonymous".to_string(),
            display_name: "Anonymous".to_string(),
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

impl ModerationConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ModResult<Self> {
        dotenv::dotenv().ok();

        let jwt_secret = env::var("MOD_JWT_SECRET")
            .map_err(|_| ModError::Validation("JWT secret required".to_string()))?;
        let token_ttl_seconds = env::var("MOD_TOKEN_TTL_SECONDS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .map_err(|_| ModError::Validation("Invalid token TTL".to_string()))?;
        let leeway_seconds = env::var("MOD_JWT_LEEWAY_SECONDS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0);

        let database_path = env::var("MOD_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/moderation.sqlite"));
        let max_connections = env::var("MOD_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let defaults = AnonymityConfig::default();
        let handle = env::var("MOD_ANONYMOUS_HANDLE").unwrap_or(defaults.handle);
        let display_name = env::var("MOD_ANONYMOUS_DISPLAY_NAME").unwrap_or(defaults.display_name);

        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let json = env::var("MOD_LOG_JSON")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let expose_internal_errors = env::var("MOD_ENV")
            .map(|v| v.eq_ignore_ascii_case("development"))
            .unwrap_or(false);

        Ok(ModerationConfig {
            auth: AuthConfig {
                jwt_secret,
                token_ttl_seconds,
                leeway_seconds,
            },
            storage: StorageConfig {
                database_path,
                max_connections,
            },
            anonymity: AnonymityConfig {
                handle,
                display_name,
            },
            listing: ListingConfig::default(),
            logging: LoggingConfig { level, json },
            diagnostics: DiagnosticsConfig {
                expose_internal_errors,
            },
        })
    }

    /// Configuration for tests and embedding, backed by an in-memory store
    pub fn for_testing(jwt_secret: &str) -> Self {
        ModerationConfig {
            auth: AuthConfig {
                jwt_secret: jwt_secret.to_string(),
                token_ttl_seconds: 3600,
                leeway_seconds: 0,
            },
            storage: StorageConfig {
                database_path: PathBuf::from(":memory:"),
                max_connections: 1,
            },
            anonymity: AnonymityConfig::default(),
            listing: ListingConfig::default(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
            diagnostics: DiagnosticsConfig {
                expose_internal_errors: true,
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> ModResult<()> {
        if self.auth.jwt_secret.len() < 32 {
            return Err(ModError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.auth.token_ttl_seconds <= 0 {
            return Err(ModError::Validation(
                "Token TTL must be positive".to_string(),
            ));
        }

        if self.listing.default_limit == 0 || self.listing.default_limit > self.listing.max_limit {
            return Err(ModError::Validation(
                "Default page size must be between 1 and the maximum".to_string(),
            ));
        }

        if self.anonymity.handle.trim().is_empty() {
            return Err(ModError::Validation(
                "Anonymous handle cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
