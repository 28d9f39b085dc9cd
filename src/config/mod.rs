use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    /// Path prefix the resources are mounted under, always ending in '/'
    pub mount: String,
    /// Product segment of the vendor media types (application/vnd.<product>.*)
    pub product: String,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; records are kept in memory when unset
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub require_https: bool,
    pub realm: String,
    pub jwt_secret: String,
    pub session_cookie: String,
    pub session_expiry_hours: u64,
    pub login_url: String,
    /// bcrypt work factor for newly stored passwords
    pub password_cost: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Some(v) = env::var("SMT_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("SMT_MOUNT") {
            self.api.mount = normalize_mount(&v);
        }
        if let Ok(v) = env::var("SMT_PRODUCT") {
            if !v.trim().is_empty() {
                self.api.product = v.trim().to_string();
            }
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("SECURITY_REQUIRE_HTTPS") {
            self.security.require_https = v.parse().unwrap_or(self.security.require_https);
        }
        if let Ok(v) = env::var("SECURITY_REALM") {
            self.security.realm = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_SESSION_COOKIE") {
            self.security.session_cookie = v;
        }
        if let Ok(v) = env::var("SECURITY_SESSION_EXPIRY_HOURS") {
            self.security.session_expiry_hours = v.parse().unwrap_or(self.security.session_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_LOGIN_URL") {
            self.security.login_url = v;
        }
        if let Ok(v) = env::var("SECURITY_PASSWORD_COST") {
            self.security.password_cost = v.parse().unwrap_or(self.security.password_cost);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                port: 8000,
                mount: "/".to_string(),
                product: "sumatra".to_string(),
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:8000".to_string()],
                require_https: false,
                realm: "Sumatra Server API".to_string(),
                jwt_secret: "development-only-session-secret".to_string(),
                session_cookie: "sessionid".to_string(),
                session_expiry_hours: 24 * 7, // 1 week
                login_url: "/login".to_string(),
                password_cost: bcrypt::DEFAULT_COST,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                port: 8000,
                mount: "/".to_string(),
                product: "sumatra".to_string(),
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec![],
                require_https: true,
                realm: "Sumatra Server API".to_string(),
                jwt_secret: String::new(),
                session_cookie: "sessionid".to_string(),
                session_expiry_hours: 24,
                login_url: "/login".to_string(),
                password_cost: bcrypt::DEFAULT_COST,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                port: 8000,
                mount: "/".to_string(),
                product: "sumatra".to_string(),
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                enable_cors: false,
                cors_origins: vec![],
                require_https: true,
                realm: "Sumatra Server API".to_string(),
                jwt_secret: String::new(),
                session_cookie: "sessionid".to_string(),
                session_expiry_hours: 8,
                login_url: "/login".to_string(),
                password_cost: bcrypt::DEFAULT_COST,
            },
        }
    }

    /// URL scheme used when building absolute resource URIs
    pub fn scheme(&self) -> &'static str {
        if self.security.require_https {
            "https"
        } else {
            "http"
        }
    }
}

fn normalize_mount(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_defaults_allow_sessions() {
        let config = AppConfig::development();
        assert!(!config.security.jwt_secret.is_empty());
        assert_eq!(config.api.mount, "/");
        assert_eq!(config.scheme(), "http");
    }

    #[test]
    fn production_requires_explicit_secret() {
        let config = AppConfig::production();
        assert!(config.security.jwt_secret.is_empty());
        assert!(config.security.require_https);
        assert_eq!(config.scheme(), "https");
    }

    #[test]
    fn mount_is_normalized() {
        assert_eq!(normalize_mount(""), "/");
        assert_eq!(normalize_mount("/"), "/");
        assert_eq!(normalize_mount("records"), "/records/");
        assert_eq!(normalize_mount("/smt/records/"), "/smt/records/");
    }
}
