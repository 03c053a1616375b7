//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `FITAPI_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `FITAPI_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `FITAPI_AUTH__SESSION__COOKIE_SECURE=false` sets `auth.session.cookie_secure`.
//!
//! ## Role hierarchy
//!
//! `auth.role_hierarchy` maps each role to the roles it directly inherits:
//!
//! ```yaml
//! auth:
//!   role_hierarchy:
//!     USER: []
//!     MODERATOR: [USER]
//!     ADMIN: [USER, MODERATOR]
//! ```
//!
//! A cyclic hierarchy fails validation, so the server refuses to start rather than looping on an
//! authorization check.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::password::Argon2Params;
use crate::auth::roles::{RoleEdges, RoleHierarchy, default_edges};
use crate::auth::session::is_valid_cookie_name;
use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "FITAPI_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Shared secret for signing bearer tokens (required)
    pub secret_key: Option<String>,
    /// Email address for the initial admin user (created on first startup)
    pub admin_email: String,
    /// Password for the initial admin user
    pub admin_password: Option<String>,
    /// Authentication and authorization settings
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Allow new users to self-register via `/auth/register`
    pub allow_registration: bool,
    /// Role -> directly inherited roles
    pub role_hierarchy: RoleEdges,
    /// Session cookie configuration
    pub session: SessionConfig,
    /// Bearer token settings
    pub security: SecurityConfig,
    /// Password validation and hashing
    pub password: PasswordConfig,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Session lifetime
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Cookie name carrying the session token
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
    /// How often expired sessions are swept from storage
    #[serde(with = "humantime_serde")]
    pub purge_interval: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// Bearer token lifetime
    #[serde(with = "humantime_serde")]
    pub jwt_expiry: Duration,
}

/// Password validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl PasswordConfig {
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            secret_key: None,
            admin_email: "admin@fitapi.local".to_string(),
            admin_password: None,
            auth: AuthConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_registration: true,
            role_hierarchy: default_edges(),
            session: SessionConfig::default(),
            security: SecurityConfig::default(),
            password: PasswordConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            cookie_name: "session".to_string(),
            cookie_secure: true,
            cookie_same_site: "lax".to_string(),
            purge_interval: Duration::from_secs(10 * 60),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_expiry: Duration::from_secs(24 * 60 * 60), // 24 hours
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        let params = Argon2Params::default();
        Self {
            min_length: 8,
            max_length: 64,
            argon2_memory_kib: params.memory_kib,
            argon2_iterations: params.iterations,
            argon2_parallelism: params.parallelism,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // FITAPI_CONFIG names the file itself and is consumed by clap
            .merge(Env::prefixed("FITAPI_").ignore(&["CONFIG"]).split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "Config validation: secret_key is not configured. \
                     Please set FITAPI_SECRET_KEY environment variable or add secret_key to config file."
                    .to_string(),
            });
        }

        let password = &self.auth.password;
        if password.min_length > password.max_length {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: Invalid password configuration: min_length ({}) cannot be greater than max_length ({})",
                    password.min_length, password.max_length
                ),
            });
        }
        if password.min_length < 1 {
            return Err(Error::Internal {
                operation: "Config validation: Invalid password configuration: min_length must be at least 1".to_string(),
            });
        }

        let jwt_expiry = self.auth.security.jwt_expiry.as_secs();
        if jwt_expiry < 300 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too short (minimum 5 minutes)".to_string(),
            });
        }
        if jwt_expiry > 86400 * 30 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too long (maximum 30 days)".to_string(),
            });
        }

        let session = &self.auth.session;
        if !is_valid_cookie_name(&session.cookie_name) {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: auth.session.cookie_name must be a non-empty cookie token without spaces or separators (got '{}')",
                    session.cookie_name
                ),
            });
        }
        let session_timeout = session.timeout.as_secs();
        if session_timeout < 60 {
            return Err(Error::Internal {
                operation: "Config validation: auth.session.timeout is too short (minimum 1 minute)".to_string(),
            });
        }
        if session_timeout > 86400 * 365 {
            return Err(Error::Internal {
                operation: "Config validation: auth.session.timeout is too long (maximum 365 days)".to_string(),
            });
        }
        if !matches!(session.cookie_same_site.to_ascii_lowercase().as_str(), "strict" | "lax" | "none") {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: auth.session.cookie_same_site must be one of strict, lax or none (got '{}')",
                    session.cookie_same_site
                ),
            });
        }
        if session.purge_interval.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: auth.session.purge_interval must be greater than zero".to_string(),
            });
        }

        self.role_hierarchy()?;

        Ok(())
    }

    /// Build the immutable role hierarchy from `auth.role_hierarchy`.
    pub fn role_hierarchy(&self) -> Result<RoleHierarchy, Error> {
        RoleHierarchy::new(self.auth.role_hierarchy.clone()).map_err(|e| Error::Internal {
            operation: format!("Config validation: {e}"),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::Role;
    use figment::Jail;

    fn args() -> Args {
        Args {
            config: "test.yaml".to_string(),
            validate: false,
        }
    }

    fn valid_config() -> Config {
        Config {
            secret_key: Some("test-secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.auth.session.cookie_name, "session");

        let hierarchy = config.role_hierarchy().unwrap();
        assert!(hierarchy.satisfies(Role::Admin, Role::User));
        assert!(!hierarchy.satisfies(Role::User, Role::Moderator));
    }

    #[test]
    fn test_load_from_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
port: 8080
auth:
  session:
    timeout: 2h
    cookie_secure: false
  security:
    jwt_expiry: 30m
  role_hierarchy:
    USER: []
    MODERATOR: [USER]
    ADMIN: [MODERATOR]
"#,
            )?;

            let config = Config::load(&args())?;

            assert_eq!(config.port, 8080);
            assert_eq!(config.auth.session.timeout, Duration::from_secs(2 * 60 * 60));
            assert!(!config.auth.session.cookie_secure);
            // Unset fields keep their defaults
            assert_eq!(config.auth.session.cookie_name, "session");
            assert_eq!(config.auth.security.jwt_expiry, Duration::from_secs(30 * 60));
            assert_eq!(config.auth.role_hierarchy.get(&Role::Admin), Some(&vec![Role::Moderator]));

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\n")?;
            jail.set_env("FITAPI_HOST", "127.0.0.1");
            jail.set_env("FITAPI_PORT", "9090");
            jail.set_env("FITAPI_AUTH__SESSION__COOKIE_NAME", "fit_session");

            let config = Config::load(&args())?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 9090);
            assert_eq!(config.auth.session.cookie_name, "fit_session");
            assert_eq!(config.bind_address(), "127.0.0.1:9090");

            Ok(())
        });
    }

    #[test]
    fn test_cyclic_hierarchy_fails_to_load() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
auth:
  role_hierarchy:
    USER: [ADMIN]
    ADMIN: [USER]
"#,
            )?;

            let err = Config::load(&args()).unwrap_err();
            assert!(err.to_string().contains("cycle"), "unexpected error: {err}");

            Ok(())
        });
    }

    #[test]
    fn test_unknown_field_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\nsecret_keys: typo\n")?;
            assert!(Config::load(&args()).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_missing_secret_key() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let config = Config {
            secret_key: Some(String::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_password_lengths() {
        let mut config = valid_config();
        config.auth.password.min_length = 20;
        config.auth.password.max_length = 10;
        assert!(config.validate().is_err());

        config.auth.password.min_length = 0;
        config.auth.password.max_length = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jwt_expiry_bounds() {
        let mut config = valid_config();
        config.auth.security.jwt_expiry = Duration::from_secs(60);
        assert!(config.validate().is_err());

        config.auth.security.jwt_expiry = Duration::from_secs(86400 * 31);
        assert!(config.validate().is_err());

        config.auth.security.jwt_expiry = Duration::from_secs(3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cookie_settings() {
        let mut config = valid_config();
        config.auth.session.cookie_same_site = "sometimes".to_string();
        assert!(config.validate().is_err());

        config.auth.session.cookie_same_site = "Strict".to_string();
        assert!(config.validate().is_ok());

        for name in ["  ", "", "my session", "session;x", "s\u{e9}ssion"] {
            config.auth.session.cookie_name = name.to_string();
            assert!(config.validate().is_err(), "cookie name {name:?} should be rejected");
        }

        config.auth.session.cookie_name = "fit_session".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_timeout_bounds() {
        let mut config = valid_config();
        config.auth.session.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config.auth.session.timeout = Duration::from_secs(86400 * 366);
        assert!(config.validate().is_err());

        // Far enough out to overflow the calendar when added to now
        config.auth.session.timeout = Duration::from_secs(86_400 * 365 * 1_000_000);
        assert!(config.validate().is_err());

        config.auth.session.timeout = Duration::from_secs(86400 * 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_huge_session_timeout_fails_to_load() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: "test-secret"
auth:
  session:
    timeout: 1000000years
"#,
            )?;

            let result = Config::load(&args());
            assert!(result.is_err());
            Ok(())
        });
    }
}
