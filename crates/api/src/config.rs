//! Application configuration

use std::env;
use std::time::Duration;

use bizdir_billing::{GatewayConfig, GatewayMode};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,

    // Authentication
    pub supabase_jwt_secret: String,

    // Payment gateway
    pub gateway: GatewayConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            run_migrations: env::var("RUN_MIGRATIONS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),

            // Authentication
            supabase_jwt_secret: {
                let secret = env::var("SUPABASE_JWT_SECRET")
                    .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "SUPABASE_JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },

            // Payment gateway: the key is selected here, once, for the whole process
            gateway: {
                let mode = match env::var("PAYMENT_GATEWAY_MODE") {
                    Ok(raw) => raw.parse::<GatewayMode>().map_err(|_| {
                        ConfigError::Invalid("PAYMENT_GATEWAY_MODE must be live or test")
                    })?,
                    Err(_) => GatewayMode::Test,
                };
                let timeout_secs: u64 = env::var("PAYMENT_GATEWAY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30);

                GatewayConfig::new(
                    mode,
                    env::var("PAYMENT_GATEWAY_LIVE_KEY").ok(),
                    env::var("PAYMENT_GATEWAY_TEST_KEY").ok(),
                    env::var("PAYMENT_GATEWAY_ENDPOINT").ok(),
                )
                .map_err(|e| ConfigError::Gateway(e.to_string()))?
                .with_timeout(Duration::from_secs(timeout_secs))
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
    #[error("Payment gateway configuration: {0}")]
    Gateway(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to set required env vars for testing
    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        // Must be at least 32 characters
        env::set_var(
            "SUPABASE_JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
        env::set_var("PAYMENT_GATEWAY_TEST_KEY", "test-security-key");
        env::remove_var("PAYMENT_GATEWAY_MODE");
        env::remove_var("PAYMENT_GATEWAY_LIVE_KEY");
    }

    /// Helper to clear env vars after tests
    fn cleanup_config() {
        for var in [
            "DATABASE_URL",
            "SUPABASE_JWT_SECRET",
            "PAYMENT_GATEWAY_MODE",
            "PAYMENT_GATEWAY_LIVE_KEY",
            "PAYMENT_GATEWAY_TEST_KEY",
            "PAYMENT_GATEWAY_ENDPOINT",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_to_test_gateway() {
        setup_minimal_config();

        let config = Config::from_env().expect("minimal config should load");
        assert_eq!(config.gateway.mode, GatewayMode::Test);
        assert_eq!(config.gateway.security_key, "test-security-key");
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert!(!config.run_migrations);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_live_mode_requires_live_key() {
        setup_minimal_config();
        env::set_var("PAYMENT_GATEWAY_MODE", "live");

        let result = Config::from_env();
        assert!(
            matches!(result, Err(ConfigError::Gateway(_))),
            "live mode without a live key should fail"
        );

        env::set_var("PAYMENT_GATEWAY_LIVE_KEY", "live-security-key");
        let config = Config::from_env().expect("live config should load");
        assert_eq!(config.gateway.mode, GatewayMode::Live);
        assert_eq!(config.gateway.security_key, "live-security-key");

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_invalid_gateway_mode_rejected() {
        setup_minimal_config();
        env::set_var("PAYMENT_GATEWAY_MODE", "staging");

        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_weak_jwt_secret_rejected() {
        setup_minimal_config();
        env::set_var("SUPABASE_JWT_SECRET", "short");

        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        setup_minimal_config();
        env::remove_var("DATABASE_URL");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));

        cleanup_config();
    }
}
