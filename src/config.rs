use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Admin API surface configuration
    pub security: SecurityConfig,
    /// IP reputation configuration
    pub reputation: ReputationConfig,
    /// Bot shield (proof-of-work challenge) configuration
    pub shield: ShieldConfig,
    /// Event journal configuration
    pub journal: JournalConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Require the admin API key on /security routes
    pub enable_admin_auth: bool,
    /// Admin API key - MUST be from environment
    pub admin_api_key: String,
    /// Paths reachable without the admin key
    pub public_paths: Vec<String>,
}

/// Configuration for the IP reputation store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// Failed attempts inside the window before an automatic temporary block
    pub failure_threshold: i64,
    /// Sliding failure window in seconds
    pub failure_window_secs: u64,
    /// First temporary block duration in seconds; doubles per offense
    pub base_block_secs: u64,
    /// Upper bound on any temporary block duration
    pub max_block_secs: u64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 900,
            base_block_secs: 900,
            max_block_secs: 86_400,
        }
    }
}

/// Configuration for the proof-of-work challenge engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// Required leading zero bits at zero recent volume
    pub min_difficulty: u8,
    /// Difficulty ceiling regardless of volume
    pub max_difficulty: u8,
    /// Recent attempts per additional difficulty bit
    pub attempts_per_step: i64,
    /// Per-IP attempt window in seconds (the difficulty signal)
    pub attempt_window_secs: u64,
    /// Challenge nonce lifetime in seconds
    pub challenge_ttl_secs: u64,
    /// Trust marker lifetime in seconds after a verified solution
    pub trust_ttl_secs: u64,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            min_difficulty: 4,
            max_difficulty: 12,
            attempts_per_step: 250,
            attempt_window_secs: 600,
            challenge_ttl_secs: 300,
            trust_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, uses the in-memory ring only)
    pub postgres_enabled: bool,
    /// In-memory ring capacity
    pub max_memory_events: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/flint_gateway".to_string(),
            postgres_enabled: false,
            max_memory_events: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Enable per-request logging
    pub log_requests: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8750,
            },
            security: SecurityConfig {
                enable_admin_auth: true,
                admin_api_key: String::new(), // MUST be configured
                public_paths: vec![
                    "/health".to_string(),
                    "/shield/challenge".to_string(),
                    "/shield/verify-connection".to_string(),
                ],
            },
            reputation: ReputationConfig::default(),
            shield: ShieldConfig::default(),
            journal: JournalConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                log_requests: true,
            },
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables and validate it.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Ok(host) = env::var("FLINT_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("FLINT_PORT") {
            config.server.port = port.parse().context("Invalid FLINT_PORT value")?;
        }

        // Admin surface
        if let Ok(enable) = env::var("FLINT_ENABLE_ADMIN_AUTH") {
            config.security.enable_admin_auth = enable
                .parse()
                .context("Invalid FLINT_ENABLE_ADMIN_AUTH value")?;
        }
        if let Ok(key) = env::var("FLINT_ADMIN_API_KEY") {
            config.security.admin_api_key = key;
        }

        // Reputation configuration
        if let Ok(threshold) = env::var("FLINT_FAILURE_THRESHOLD") {
            config.reputation.failure_threshold = threshold
                .parse()
                .context("Invalid FLINT_FAILURE_THRESHOLD value")?;
        }
        if let Ok(secs) = env::var("FLINT_FAILURE_WINDOW_SECS") {
            config.reputation.failure_window_secs = secs
                .parse()
                .context("Invalid FLINT_FAILURE_WINDOW_SECS value")?;
        }
        if let Ok(secs) = env::var("FLINT_BASE_BLOCK_SECS") {
            config.reputation.base_block_secs =
                secs.parse().context("Invalid FLINT_BASE_BLOCK_SECS value")?;
        }
        if let Ok(secs) = env::var("FLINT_MAX_BLOCK_SECS") {
            config.reputation.max_block_secs =
                secs.parse().context("Invalid FLINT_MAX_BLOCK_SECS value")?;
        }

        // Shield configuration
        if let Ok(bits) = env::var("FLINT_SHIELD_MIN_DIFFICULTY") {
            config.shield.min_difficulty = bits
                .parse()
                .context("Invalid FLINT_SHIELD_MIN_DIFFICULTY value")?;
        }
        if let Ok(bits) = env::var("FLINT_SHIELD_MAX_DIFFICULTY") {
            config.shield.max_difficulty = bits
                .parse()
                .context("Invalid FLINT_SHIELD_MAX_DIFFICULTY value")?;
        }
        if let Ok(step) = env::var("FLINT_SHIELD_ATTEMPTS_PER_STEP") {
            config.shield.attempts_per_step = step
                .parse()
                .context("Invalid FLINT_SHIELD_ATTEMPTS_PER_STEP value")?;
        }
        if let Ok(secs) = env::var("FLINT_SHIELD_ATTEMPT_WINDOW_SECS") {
            config.shield.attempt_window_secs = secs
                .parse()
                .context("Invalid FLINT_SHIELD_ATTEMPT_WINDOW_SECS value")?;
        }
        if let Ok(secs) = env::var("FLINT_SHIELD_CHALLENGE_TTL_SECS") {
            config.shield.challenge_ttl_secs = secs
                .parse()
                .context("Invalid FLINT_SHIELD_CHALLENGE_TTL_SECS value")?;
        }
        if let Ok(secs) = env::var("FLINT_SHIELD_TRUST_TTL_SECS") {
            config.shield.trust_ttl_secs = secs
                .parse()
                .context("Invalid FLINT_SHIELD_TRUST_TTL_SECS value")?;
        }

        // Journal configuration
        if let Ok(url) = env::var("FLINT_POSTGRES_URL") {
            config.journal.postgres_url = url;
        }
        if let Ok(enabled) = env::var("FLINT_POSTGRES_ENABLED") {
            config.journal.postgres_enabled = enabled
                .parse()
                .context("Invalid FLINT_POSTGRES_ENABLED value")?;
        }
        if let Ok(max) = env::var("FLINT_MAX_MEMORY_EVENTS") {
            config.journal.max_memory_events =
                max.parse().context("Invalid FLINT_MAX_MEMORY_EVENTS value")?;
        }

        // Logging configuration
        if let Ok(level) = env::var("FLINT_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(log_requests) = env::var("FLINT_LOG_REQUESTS") {
            config.logging.log_requests = log_requests
                .parse()
                .context("Invalid FLINT_LOG_REQUESTS value")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for security and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.security.enable_admin_auth {
            if self.security.admin_api_key.is_empty() {
                return Err(anyhow::anyhow!(
                    "Admin auth is enabled but FLINT_ADMIN_API_KEY is not set"
                ));
            }
            if self.security.admin_api_key.len() < 32 {
                return Err(anyhow::anyhow!(
                    "Admin API key is too short (minimum 32 characters for security)"
                ));
            }
        } else {
            warn!("Admin auth disabled - /security endpoints are unprotected");
        }

        if self.reputation.failure_threshold < 1 {
            return Err(anyhow::anyhow!("Failure threshold must be at least 1"));
        }
        if self.reputation.base_block_secs == 0 {
            return Err(anyhow::anyhow!("Base block duration must be non-zero"));
        }
        if self.reputation.max_block_secs < self.reputation.base_block_secs {
            return Err(anyhow::anyhow!(
                "Max block duration must be >= base block duration"
            ));
        }

        if self.shield.min_difficulty == 0
            || self.shield.min_difficulty > self.shield.max_difficulty
        {
            return Err(anyhow::anyhow!(
                "Shield difficulty range is invalid: [{}, {}]",
                self.shield.min_difficulty,
                self.shield.max_difficulty
            ));
        }
        if self.shield.max_difficulty > 32 {
            return Err(anyhow::anyhow!(
                "Shield max difficulty {} would make challenges unsolvable",
                self.shield.max_difficulty
            ));
        }
        if self.shield.attempts_per_step < 1 {
            return Err(anyhow::anyhow!(
                "Shield attempts_per_step must be at least 1"
            ));
        }
        if self.shield.challenge_ttl_secs == 0 || self.shield.challenge_ttl_secs > 3600 {
            return Err(anyhow::anyhow!(
                "Challenge TTL must be between 1 second and 1 hour"
            ));
        }

        if self.journal.postgres_enabled && self.journal.postgres_url.is_empty() {
            return Err(anyhow::anyhow!(
                "Postgres is enabled but FLINT_POSTGRES_URL is empty"
            ));
        }
        if self.journal.max_memory_events == 0 {
            return Err(anyhow::anyhow!("Journal memory capacity must be non-zero"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.security.admin_api_key = "testAdminKey1234567890abcdefghijklmn".to_string();
        config
    }

    #[test]
    fn test_config_validation_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_missing_admin_key() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_short_admin_key() {
        let mut config = GatewayConfig::default();
        config.security.admin_api_key = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_inverted_difficulty_range() {
        let mut config = valid_config();
        config.shield.min_difficulty = 10;
        config.shield.max_difficulty = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_block_duration_inversion() {
        let mut config = valid_config();
        config.reputation.base_block_secs = 7200;
        config.reputation.max_block_secs = 3600;
        assert!(config.validate().is_err());
    }
}
