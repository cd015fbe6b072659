use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::publisher::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, PublishPolicy};
use crate::reference::join_url;
use crate::watcher::{DEFAULT_MAX_RECONNECT_DELAY, DEFAULT_RECONNECT_DELAY, ReconnectPolicy};

/// Sub-path of the catalog service that accepts image records.
pub const IMAGES_PATH: &str = "/images";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base url of the catalog service
    pub catalog_url: String,
    pub events: EventsConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub images_path: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    catalog_url: Option<String>,
    events: EventsConfig,
    publish: PublishConfig,
}

impl AppConfig {
    /// Loads defaults, then the optional file, then `IMGWATCH_*`
    /// environment variables, then the command line override.
    pub fn load(file: Option<&Path>, catalog_url: Option<String>) -> Result<Self> {
        Self::load_with_env(file, catalog_url, environment())
    }

    fn load_with_env(
        file: Option<&Path>,
        catalog_url: Option<String>,
        env: Environment,
    ) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("events.reconnect_delay_ms", millis(DEFAULT_RECONNECT_DELAY))?
            .set_default(
                "events.max_reconnect_delay_ms",
                millis(DEFAULT_MAX_RECONNECT_DELAY),
            )?
            .set_default("publish.max_attempts", i64::from(DEFAULT_MAX_ATTEMPTS))?
            .set_default("publish.retry_delay_ms", millis(DEFAULT_RETRY_DELAY))?
            .set_default("publish.images_path", IMAGES_PATH)?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).required(true));
        }

        let raw: RawConfig = builder
            .add_source(env)
            .set_override_option("catalog_url", catalog_url)?
            .build()?
            .try_deserialize()?;

        let catalog_url = raw
            .catalog_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AppError::Config("catalog url needs to be set".to_string()))?;

        if raw.publish.max_attempts == 0 {
            return Err(AppError::Config(
                "publish.max_attempts must be at least 1".to_string(),
            ));
        }

        let config = Self {
            catalog_url,
            events: raw.events,
            publish: raw.publish,
        };
        // fail at startup rather than on the first push
        config.images_url()?;
        Ok(config)
    }

    /// The endpoint image records are PUT to.
    pub fn images_url(&self) -> Result<Url> {
        Ok(join_url(&self.catalog_url, &self.publish.images_path)?)
    }

    pub fn publish_policy(&self) -> PublishPolicy {
        PublishPolicy {
            max_attempts: self.publish.max_attempts,
            retry_delay: Duration::from_millis(self.publish.retry_delay_ms),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_millis(self.events.reconnect_delay_ms),
            max_delay: Duration::from_millis(self.events.max_reconnect_delay_ms),
        }
    }
}

/// `IMGWATCH_CATALOG_URL`, `IMGWATCH_PUBLISH__MAX_ATTEMPTS` and so on.
fn environment() -> Environment {
    Environment::with_prefix("IMGWATCH")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn millis(duration: Duration) -> i64 {
    duration.as_millis() as i64
}
