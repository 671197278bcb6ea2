use std::collections::HashMap;

use anyhow::{Context, Result};
use log::*;
use r2d2::Pool;
use r2d2_postgres::{PostgresConnectionManager, TlsMode};
use serde::{Deserialize, Serialize};
use url::Url;

use infra::persistence::DocumentConnectionManager;

const ENV_PREFIX: &str = "LARDER_";

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct Config {
    pub postgres: PostgresConfig,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default)]
    pub pool_size: Option<u32>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvOverrides {
    pub postgres_url: Option<String>,
    pub user: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl PostgresConfig {
    pub(crate) fn build(&self) -> Result<Pool<DocumentConnectionManager>> {
        debug!("Build pool for {}", redacted(&self.url));

        let manager =
            PostgresConnectionManager::new(&*self.url, TlsMode::None).context("postgres url")?;

        let mut builder = r2d2::Pool::builder();
        if let Some(size) = self.pool_size {
            builder = builder.max_size(size);
        }

        debug!("Pool builder: {:?}", builder);
        let pool = builder
            .build(DocumentConnectionManager::new(manager))
            .context("build pool")?;

        Ok(pool)
    }
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self> {
        let overrides = envy::prefixed(ENV_PREFIX)
            .from_env()
            .context("read LARDER_* environment")?;
        Ok(overrides)
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = self.postgres_url.as_ref() {
            debug!("Postgres url from environment: {}", redacted(url));
            config.postgres.url = url.clone();
        }
    }
}

pub fn redacted(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                // Only fails for URLs that cannot carry credentials at all.
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct EnvLogger {
    #[serde(default)]
    level: Option<LogLevel>,
    #[serde(default)]
    modules: HashMap<String, LogLevel>,
    #[serde(default)]
    timestamp_nanos: bool,
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl EnvLogger {
    pub fn builder(&self) -> env_logger::Builder {
        let mut b = env_logger::Builder::from_default_env();
        if let Some(level) = self.level {
            b.filter_level(level.to_filter());
        }

        for (module, level) in self.modules.iter() {
            b.filter_module(&module, level.to_filter());
        }

        if self.timestamp_nanos {
            b.format_timestamp_nanos();
        }

        b
    }
}
