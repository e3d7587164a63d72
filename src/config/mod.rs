//! Configuration loading for the gateway.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `GATEWAY_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "GATEWAY_";

/// Application configuration derived from `GATEWAY_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    #[serde(default = "default_providers_dir")]
    pub providers_dir: PathBuf,
    #[serde(default)]
    pub catalog: CatalogCacheConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub oauth: OAuthRefreshConfig,
    #[serde(default)]
    pub invocation: InvocationPolicyConfig,
}

/// Bounds for the in-process provider and translation caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCacheConfig {
    pub provider_cache_capacity: usize,
    pub translation_cache_capacity: usize,
    pub translation_cache_ttl_seconds: u64,
}

impl Default for CatalogCacheConfig {
    fn default() -> Self {
        Self {
            provider_cache_capacity: 50,
            translation_cache_capacity: 50,
            translation_cache_ttl_seconds: 3600,
        }
    }
}

impl CatalogCacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_cache_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity {
                field: "PROVIDER_CACHE_CAPACITY",
            });
        }
        if self.translation_cache_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity {
                field: "TRANSLATION_CACHE_CAPACITY",
            });
        }
        Ok(())
    }

    pub fn translation_ttl(&self) -> Duration {
        Duration::from_secs(self.translation_cache_ttl_seconds)
    }
}

/// Defaults applied to MCP adapters that do not declare their own timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    pub default_timeout_seconds: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 60,
        }
    }
}

impl McpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_seconds == 0 {
            return Err(ConfigError::InvalidMcpTimeout {
                value: self.default_timeout_seconds,
            });
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }
}

/// Token refresh critical-section settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthRefreshConfig {
    /// How long an invocation waits for the per-user refresh lock
    pub lock_timeout_ms: u64,
    /// Lease on the lock in case the holder dies mid-refresh
    pub lock_ttl_seconds: u64,
    /// Skew used when an adapter config does not declare one
    pub expiry_skew_seconds: u64,
}

impl Default for OAuthRefreshConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 1000,
            lock_ttl_seconds: 30,
            expiry_skew_seconds: 300,
        }
    }
}

impl OAuthRefreshConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=10_000).contains(&self.lock_timeout_ms) {
            return Err(ConfigError::InvalidOAuthLockTimeout {
                value: self.lock_timeout_ms,
            });
        }
        if self.lock_ttl_seconds == 0 {
            return Err(ConfigError::InvalidOAuthLockTtl {
                value: self.lock_ttl_seconds,
            });
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn expiry_skew(&self) -> Duration {
        Duration::from_secs(self.expiry_skew_seconds)
    }
}

/// Local rate limit and circuit breaker settings for invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationPolicyConfig {
    /// Calls per user and provider per minute, 0 disables the limit
    pub rate_limit_per_minute: u32,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_seconds: u64,
}

impl Default for InvocationPolicyConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 0,
            breaker_failure_threshold: 5,
            breaker_cooldown_seconds: 30,
        }
    }
}

impl InvocationPolicyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.breaker_failure_threshold == 0 {
            return Err(ConfigError::InvalidBreakerThreshold {
                value: self.breaker_failure_threshold,
            });
        }
        Ok(())
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_seconds)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            operator_tokens: Vec::new(),
            crypto_key: None,
            providers_dir: default_providers_dir(),
            catalog: CatalogCacheConfig::default(),
            mcp: McpConfig::default(),
            oauth: OAuthRefreshConfig::default(),
            invocation: InvocationPolicyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.operator_tokens.is_empty() {
            config.operator_tokens = vec!["[REDACTED]".to_string()];
        }
        if config.crypto_key.is_some() {
            config.crypto_key = Some(b"[REDACTED]".to_vec());
        }
        config.database_url = redact_url_password(&config.database_url);
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.crypto_key {
            Some(ref key) if key.len() != 32 => {
                return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
            }
            Some(_) => {}
            None => return Err(ConfigError::MissingCryptoKey),
        }

        if self.operator_tokens.is_empty() {
            return Err(ConfigError::MissingOperatorTokens);
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        self.catalog.validate()?;
        self.mcp.validate()?;
        self.oauth.validate()?;
        self.invocation.validate()?;

        Ok(())
    }
}

fn redact_url_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("REDACTED")).is_ok() {
                parsed.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_log_format_for_profile(profile: &str) -> String {
    match profile {
        "local" | "test" => "pretty".to_string(),
        _ => default_log_format(),
    }
}

fn default_database_url() -> String {
    "sqlite://gateway.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_providers_dir() -> PathBuf {
    PathBuf::from("providers")
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("no operator tokens configured; set GATEWAY_OPERATOR_TOKEN or GATEWAY_OPERATOR_TOKENS")]
    MissingOperatorTokens,
    #[error("crypto key is missing; set GATEWAY_CRYPTO_KEY environment variable")]
    MissingCryptoKey,
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("{field} must be greater than zero")]
    InvalidCacheCapacity { field: &'static str },
    #[error("MCP default timeout must be positive, got {value}")]
    InvalidMcpTimeout { value: u64 },
    #[error("OAuth lock timeout must be between 100 and 10000 ms, got {value}")]
    InvalidOAuthLockTimeout { value: u64 },
    #[error("OAuth lock ttl must be positive, got {value}")]
    InvalidOAuthLockTtl { value: u64 },
    #[error("circuit breaker failure threshold must be positive, got {value}")]
    InvalidBreakerThreshold { value: u32 },
    #[error("invalid value '{value}' for {key}")]
    InvalidNumber { key: &'static str, value: String },
}

/// Loads configuration using layered `.env` files and `GATEWAY_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.<profile>`, `.env.<profile>.local`,
    /// then the process environment, later layers winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_string(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_bind_addr =
            take_string(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take_string(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take_string(&mut layered, "LOG_FORMAT")
            .unwrap_or_else(|| default_log_format_for_profile(&profile));
        let database_url =
            take_string(&mut layered, "DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = take_number(&mut layered, "DB_MAX_CONNECTIONS")?
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take_number(&mut layered, "DB_ACQUIRE_TIMEOUT_MS")?
            .unwrap_or_else(default_db_acquire_timeout_ms);

        // Either a comma-separated list or a single token
        let operator_tokens = if let Some(tokens) = layered.remove("OPERATOR_TOKENS") {
            tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(token) = take_string(&mut layered, "OPERATOR_TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let crypto_key = match take_string(&mut layered, "CRYPTO_KEY") {
            Some(key_str) => {
                use base64::{Engine as _, engine::general_purpose};
                Some(general_purpose::STANDARD.decode(key_str.trim()).map_err(|e| {
                    ConfigError::InvalidCryptoKeyBase64 {
                        error: e.to_string(),
                    }
                })?)
            }
            None => None,
        };

        let providers_dir = take_string(&mut layered, "PROVIDERS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_providers_dir);

        let cache_defaults = CatalogCacheConfig::default();
        let catalog = CatalogCacheConfig {
            provider_cache_capacity: take_number(&mut layered, "PROVIDER_CACHE_CAPACITY")?
                .unwrap_or(cache_defaults.provider_cache_capacity),
            translation_cache_capacity: take_number(&mut layered, "TRANSLATION_CACHE_CAPACITY")?
                .unwrap_or(cache_defaults.translation_cache_capacity),
            translation_cache_ttl_seconds: take_number(
                &mut layered,
                "TRANSLATION_CACHE_TTL_SECONDS",
            )?
            .unwrap_or(cache_defaults.translation_cache_ttl_seconds),
        };

        let mcp = McpConfig {
            default_timeout_seconds: take_number(&mut layered, "MCP_DEFAULT_TIMEOUT_SECONDS")?
                .unwrap_or(McpConfig::default().default_timeout_seconds),
        };

        let oauth_defaults = OAuthRefreshConfig::default();
        let oauth = OAuthRefreshConfig {
            lock_timeout_ms: take_number(&mut layered, "OAUTH_LOCK_TIMEOUT_MS")?
                .unwrap_or(oauth_defaults.lock_timeout_ms),
            lock_ttl_seconds: take_number(&mut layered, "OAUTH_LOCK_TTL_SECONDS")?
                .unwrap_or(oauth_defaults.lock_ttl_seconds),
            expiry_skew_seconds: take_number(&mut layered, "OAUTH_EXPIRY_SKEW_SECONDS")?
                .unwrap_or(oauth_defaults.expiry_skew_seconds),
        };

        let policy_defaults = InvocationPolicyConfig::default();
        let invocation = InvocationPolicyConfig {
            rate_limit_per_minute: take_number(&mut layered, "INVOCATION_RATE_LIMIT_PER_MINUTE")?
                .unwrap_or(policy_defaults.rate_limit_per_minute),
            breaker_failure_threshold: take_number(&mut layered, "BREAKER_FAILURE_THRESHOLD")?
                .unwrap_or(policy_defaults.breaker_failure_threshold),
            breaker_cooldown_seconds: take_number(&mut layered, "BREAKER_COOLDOWN_SECONDS")?
                .unwrap_or(policy_defaults.breaker_cooldown_seconds),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            operator_tokens,
            crypto_key,
            providers_dir,
            catalog,
            mcp,
            oauth,
            invocation,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_number<T: std::str::FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match take_string(layered, key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            operator_tokens: vec!["token".to_string()],
            crypto_key: Some(vec![7u8; 32]),
            ..AppConfig::default()
        }
    }

    #[test]
    fn default_config_with_key_and_token_validates() {
        valid_config().validate().expect("valid config");
    }

    #[test]
    fn rejects_short_crypto_key() {
        let config = AppConfig {
            crypto_key: Some(vec![1u8; 16]),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCryptoKeyLength { length: 16 })
        ));
    }

    #[test]
    fn rejects_out_of_range_lock_timeout() {
        let mut config = valid_config();
        config.oauth.lock_timeout_ms = 50;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOAuthLockTimeout { value: 50 })
        ));
    }

    #[test]
    fn rejects_zero_cache_capacity() {
        let mut config = valid_config();
        config.catalog.translation_cache_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCacheCapacity { .. })
        ));
    }

    #[test]
    fn redacted_json_hides_secrets() {
        let config = AppConfig {
            database_url: "postgres://gateway:hunter2@db/gateway".to_string(),
            ..valid_config()
        };
        let rendered = config.redacted_json().unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("\"token\""));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn take_number_reports_bad_values() {
        let mut layered = BTreeMap::new();
        layered.insert("DB_MAX_CONNECTIONS".to_string(), "many".to_string());
        let result: Result<Option<u32>, _> = take_number(&mut layered, "DB_MAX_CONNECTIONS");
        assert!(matches!(result, Err(ConfigError::InvalidNumber { .. })));
    }
}
