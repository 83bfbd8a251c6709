//! This module holds the configuration for the server

use std::net::IpAddr;

use actix_toolbox::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Configuration regarding the server
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct ServerConfig {
    /// The address the server should bind to
    pub listen_address: IpAddr,
    /// The port the server should bind to
    pub listen_port: u16,
    /// Base64 encoded secret key used to sign session cookies.
    ///
    /// Must decode to at least 64 bytes.
    pub secret_key: String,
}

/// Configuration regarding the database
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct DBConfig {
    /// The host the database is running on
    pub host: String,
    /// The port the database is running on
    pub port: u16,
    /// The name of the database
    pub name: String,
    /// The user to connect with
    pub user: String,
    /// The password to connect with
    pub password: String,
}

/// Configuration of the push notification dispatcher
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationConfig {
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Factor the delay grows by per attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Upper bound for a single retry delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// How often a retryable push failure is retried
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> u32 {
    2
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

/// Configuration of the background sweep worker
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct SweepConfig {
    /// Seconds between two runs of the request expiry job
    #[serde(default = "default_expiry_interval")]
    pub request_expiry_interval: u64,
    /// Days after which an unanswered request expires
    #[serde(default = "default_request_ttl_days")]
    pub request_ttl_days: i64,
    /// Seconds between two runs of the ex-partner archival job
    #[serde(default = "default_archive_interval")]
    pub archive_interval: u64,
    /// Seconds between two runs of the audit log purge
    #[serde(default = "default_purge_interval")]
    pub audit_purge_interval: u64,
    /// Seconds between two heartbeat log lines
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            request_expiry_interval: default_expiry_interval(),
            request_ttl_days: default_request_ttl_days(),
            archive_interval: default_archive_interval(),
            audit_purge_interval: default_purge_interval(),
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

fn default_expiry_interval() -> u64 {
    3600
}

fn default_request_ttl_days() -> i64 {
    7
}

fn default_archive_interval() -> u64 {
    3600
}

fn default_purge_interval() -> u64 {
    6 * 3600
}

fn default_heartbeat_interval() -> u64 {
    60
}

/// Configuration of audit log retention
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct AuditConfig {
    /// Days after which high and critical entries are purged
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Days after which low and medium entries are purged
    #[serde(default = "default_short_retention_days")]
    pub short_retention_days: i64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            short_retention_days: default_short_retention_days(),
        }
    }
}

fn default_retention_days() -> i64 {
    365
}

fn default_short_retention_days() -> i64 {
    90
}

/// This struct can be parsed from the configuration file
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Configuration regarding the server
    pub server: ServerConfig,
    /// Configuration regarding the database
    pub database: DBConfig,
    /// The logging configuration
    pub logging: LoggingConfig,
    /// Configuration of the push notification dispatcher
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Configuration of the background sweep worker
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Configuration of audit log retention
    #[serde(default)]
    pub audit: AuditConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [Server]
            ListenAddress = "127.0.0.1"
            ListenPort = 8080
            SecretKey = "c2VjcmV0"

            [Database]
            Host = "localhost"
            Port = 5432
            Name = "tandem"
            User = "tandem"
            Password = "password"

            [Logging]
            "#,
        )
        .unwrap();

        assert_eq!(config.notifications.base_delay_ms, 1000);
        assert_eq!(config.notifications.multiplier, 2);
        assert_eq!(config.notifications.max_delay_ms, 10_000);
        assert_eq!(config.notifications.max_retries, 3);
        assert_eq!(config.sweep.request_ttl_days, 7);
        assert_eq!(config.audit.retention_days, 365);
        assert_eq!(config.audit.short_retention_days, 90);
    }

    #[test]
    fn notification_settings_can_be_overridden() {
        let config: Config = toml::from_str(
            r#"
            [Server]
            ListenAddress = "0.0.0.0"
            ListenPort = 8000
            SecretKey = "c2VjcmV0"

            [Database]
            Host = "db"
            Port = 5432
            Name = "tandem"
            User = "tandem"
            Password = "password"

            [Logging]

            [Notifications]
            BaseDelayMs = 500
            MaxRetries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.notifications.base_delay_ms, 500);
        assert_eq!(config.notifications.max_retries, 5);
        // untouched keys keep their defaults
        assert_eq!(config.notifications.max_delay_ms, 10_000);
    }
}
