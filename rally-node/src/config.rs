// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Node configuration: a TOML file with one section per concern, overridable from the
//! environment. The resolved [`NodeConfig`] is a plain value threaded into the components at
//! startup; nothing reads configuration globally afterwards.

use serde::Deserialize;
use thiserror::Error;

use std::{env, fs, net::SocketAddr, path::Path};

use rally_common::logger::{LoggerConfig, LoggerConfigBuilder};
use rally_rest_api::config::{RestApiConfig, RestApiConfigBuilder};

/// Default frontend base used for invite and confirmation links.
const DEFAULT_FRONT_URL: &str = "http://localhost:3000";
/// Default sender address.
const DEFAULT_FROM_EMAIL: &str = "no-reply@localhost";
/// Default period of the deadline reminder job.
const DEFAULT_REMINDER_INTERVAL_SECS: u64 = 60 * 60;
/// Default period of the poll closing job.
const DEFAULT_POLL_CLOSING_INTERVAL_SECS: u64 = 30 * 60;
/// Default UTC hour of the daily digest.
const DEFAULT_DIGEST_HOUR_UTC: u8 = 8;

/// Error building the node configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading the configuration file failed.
    #[error("reading config file `{path}` failed: {source}")]
    FileUnreadable {
        /// The offending path.
        path: String,
        /// The io error.
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML.
    #[error("parsing config failed: {0}")]
    Malformed(#[from] toml::de::Error),
    /// No signing secret was provided.
    #[error("no signing secret configured; set SECRET_KEY or `auth.secret_key`")]
    MissingSecret,
}

fn env_bool(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        other => {
            log::warn!("unrecognized boolean `{}` for {}; ignoring", other, name);
            None
        }
    }
}

/// Broker selection.
#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    /// Whether the Redis-backed broker is requested.
    pub use_redis: bool,
    /// Redis endpoint.
    pub redis_url: Option<String>,
    /// Capacity of the per-subscriber rings.
    pub group_capacity: Option<usize>,
}

/// Cache selection.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Whether the Redis-backed cache is requested.
    pub use_redis: bool,
    /// Redis endpoint.
    pub redis_url: Option<String>,
}

/// Mailer settings.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Sender address.
    pub default_from_email: String,
}

/// Background scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period of the deadline reminder job.
    pub reminder_interval_secs: u64,
    /// Period of the poll closing job.
    pub poll_closing_interval_secs: u64,
    /// Whether the daily digest is scheduled.
    pub enable_daily_digest: bool,
    /// UTC hour the digest runs at.
    pub digest_hour_utc: u8,
}

#[derive(Default, Deserialize)]
struct AuthSection {
    secret_key: Option<String>,
}

#[derive(Default, Deserialize)]
struct BrokerSection {
    use_redis: Option<bool>,
    redis_url: Option<String>,
    group_capacity: Option<usize>,
}

#[derive(Default, Deserialize)]
struct CacheSection {
    use_redis: Option<bool>,
    redis_url: Option<String>,
}

#[derive(Default, Deserialize)]
struct MailerSection {
    default_from_email: Option<String>,
}

#[derive(Default, Deserialize)]
struct SchedulerSection {
    reminder_interval_secs: Option<u64>,
    poll_closing_interval_secs: Option<u64>,
    enable_daily_digest: Option<bool>,
    digest_hour_utc: Option<u8>,
}

#[derive(Default, Deserialize)]
struct SiteSection {
    front_url: Option<String>,
}

/// Builder for the node configuration; usually deserialized from `rally.toml`.
#[derive(Default, Deserialize)]
pub struct NodeConfigBuilder {
    logger: Option<LoggerConfigBuilder>,
    rest_api: Option<RestApiConfigBuilder>,
    auth: Option<AuthSection>,
    broker: Option<BrokerSection>,
    cache: Option<CacheSection>,
    mailer: Option<MailerSection>,
    scheduler: Option<SchedulerSection>,
    site: Option<SiteSection>,
    database_url: Option<String>,
}

impl NodeConfigBuilder {
    /// Reads the builder from a TOML file; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::FileUnreadable {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    /// Applies the recognized environment overrides.
    pub fn apply_env(mut self) -> Self {
        if let Ok(secret) = env::var("SECRET_KEY") {
            self.auth.get_or_insert_with(Default::default).secret_key = Some(secret);
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Ok(url) = env::var("REDIS_URL") {
            self.broker.get_or_insert_with(Default::default).redis_url = Some(url.clone());
            self.cache.get_or_insert_with(Default::default).redis_url = Some(url);
        }
        if let Some(use_redis) = env_bool("USE_REDIS_CHANNEL_LAYER") {
            self.broker.get_or_insert_with(Default::default).use_redis = Some(use_redis);
        }
        if let Some(use_redis) = env_bool("USE_REDIS_CACHE") {
            self.cache.get_or_insert_with(Default::default).use_redis = Some(use_redis);
        }
        if let Ok(raw) = env::var("WS_MAX_MESSAGE_SIZE") {
            match raw.parse::<usize>() {
                Ok(size) => {
                    let rest_api = self.rest_api.take().unwrap_or_default();
                    self.rest_api = Some(rest_api.ws_max_message_size(size));
                }
                Err(_) => log::warn!("unparsable WS_MAX_MESSAGE_SIZE `{}`; ignoring", raw),
            }
        }
        if let Ok(raw) = env::var("BIND_ADDR") {
            match raw.parse::<SocketAddr>() {
                Ok(addr) => {
                    let rest_api = self.rest_api.take().unwrap_or_default();
                    self.rest_api = Some(rest_api.binding_ip_addr(addr.ip()).binding_port(addr.port()));
                }
                Err(_) => log::warn!("unparsable BIND_ADDR `{}`; ignoring", raw),
            }
        }
        if let Ok(url) = env::var("SITE_FRONT_URL") {
            self.site.get_or_insert_with(Default::default).front_url = Some(url);
        }
        if let Ok(from) = env::var("DEFAULT_FROM_EMAIL") {
            self.mailer.get_or_insert_with(Default::default).default_from_email = Some(from);
        }
        if let Some(enabled) = env_bool("ENABLE_DAILY_DIGEST") {
            self.scheduler.get_or_insert_with(Default::default).enable_daily_digest = Some(enabled);
        }
        self
    }

    /// Builds the node configuration.
    pub fn finish(self) -> Result<NodeConfig, Error> {
        let secret_key = self
            .auth
            .unwrap_or_default()
            .secret_key
            .filter(|s| !s.is_empty())
            .ok_or(Error::MissingSecret)?;

        let broker = self.broker.unwrap_or_default();
        let cache = self.cache.unwrap_or_default();
        let mailer = self.mailer.unwrap_or_default();
        let scheduler = self.scheduler.unwrap_or_default();
        let site = self.site.unwrap_or_default();

        Ok(NodeConfig {
            logger: self.logger.unwrap_or_default().finish(),
            rest_api: self.rest_api.unwrap_or_default().finish(),
            secret_key,
            database_url: self.database_url,
            broker: BrokerConfig {
                use_redis: broker.use_redis.unwrap_or(false),
                redis_url: broker.redis_url,
                group_capacity: broker.group_capacity,
            },
            cache: CacheConfig {
                use_redis: cache.use_redis.unwrap_or(false),
                redis_url: cache.redis_url,
            },
            mailer: MailerConfig {
                default_from_email: mailer.default_from_email.unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string()),
            },
            scheduler: SchedulerConfig {
                reminder_interval_secs: scheduler.reminder_interval_secs.unwrap_or(DEFAULT_REMINDER_INTERVAL_SECS),
                poll_closing_interval_secs: scheduler
                    .poll_closing_interval_secs
                    .unwrap_or(DEFAULT_POLL_CLOSING_INTERVAL_SECS),
                enable_daily_digest: scheduler.enable_daily_digest.unwrap_or(false),
                digest_hour_utc: scheduler.digest_hour_utc.unwrap_or(DEFAULT_DIGEST_HOUR_UTC).min(23),
            },
            front_url: site.front_url.unwrap_or_else(|| DEFAULT_FRONT_URL.to_string()),
        })
    }
}

/// The resolved node configuration.
pub struct NodeConfig {
    /// Logger backend configuration.
    pub logger: LoggerConfig,
    /// HTTP/WebSocket surface configuration.
    pub rest_api: RestApiConfig,
    /// HMAC signing secret for every token the node issues.
    pub secret_key: String,
    /// Recognized and recorded; the in-memory store stand-in does not dial it.
    pub database_url: Option<String>,
    /// Broker selection.
    pub broker: BrokerConfig,
    /// Cache selection.
    pub cache: CacheConfig,
    /// Mailer settings.
    pub mailer: MailerConfig,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Frontend base URL for invite and confirmation links.
    pub front_url: String,
}
