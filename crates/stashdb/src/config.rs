//! TOML configuration.
//!
//! ```toml
//! [backend]
//! url = "memory://?timeout=60"
//! prefix = "stash."
//! default_ttl = 0
//!
//! [types.instrument]
//! namespace = "fin."
//! ttl = 3600
//! ```
//!
//! A `timeout` parameter in the backend url overrides `default_ttl`. Both
//! are in seconds and 0 means no expiry.

use serde::Deserialize;
use stashdb_core::{
    db::{
        Db,
        keyspace::DEFAULT_PREFIX,
        registry::RegisterOptions,
        store::{MemoryStore, StoreClient},
    },
    error::{ErrorClass, ErrorOrigin, InternalError},
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error as ThisError;
use tracing::{info, warn};

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("backend url '{0}' has no scheme")]
    MissingScheme(String),

    #[error("backend scheme '{0}' is not supported")]
    UnsupportedScheme(String),
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorClass::NotConfigured, ErrorOrigin::Config, err.to_string())
    }
}

///
/// Config
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub backend: BackendConfig,
    pub types: BTreeMap<String, TypeConfig>,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&text)
    }

    /// Connect the backend and build a [`Db`] whose
    /// `register_configured` applies these settings.
    pub fn build(&self) -> Result<Db, InternalError> {
        let client = self.backend.connect()?;
        let defaults = RegisterOptions {
            namespace: Some(self.backend.prefix.clone()),
            ttl: self.backend.ttl(),
        };

        let mut db = Db::new().with_default_client(client, defaults);
        for (name, ty) in &self.types {
            db = db.with_type_options(name, ty.options());
        }

        Ok(db)
    }
}

///
/// BackendConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub url: String,
    pub prefix: String,
    pub default_ttl: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            default_ttl: 0,
        }
    }
}

impl BackendConfig {
    /// Open the store client named by the url scheme.
    pub fn connect(&self) -> Result<Arc<dyn StoreClient>, ConfigError> {
        let url = BackendUrl::parse(&self.url)?;
        let client: Arc<dyn StoreClient> = match url.scheme {
            "memory" | "locmem" if url.location.is_empty() => Arc::new(MemoryStore::new()),
            "memory" | "locmem" => Arc::new(MemoryStore::named(url.location)),
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        info!(backend = client.name(), url = %self.url, "store client connected");

        Ok(client)
    }

    /// Effective default ttl: the url's `timeout` parameter, else
    /// `default_ttl`. Zero disables expiry.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        let secs = BackendUrl::parse(&self.url)
            .ok()
            .and_then(|url| url.param("timeout").map(parse_seconds))
            .unwrap_or(self.default_ttl);

        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

///
/// TypeConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TypeConfig {
    pub namespace: Option<String>,
    pub ttl: Option<u64>,
}

impl TypeConfig {
    #[must_use]
    pub fn options(&self) -> RegisterOptions {
        RegisterOptions {
            namespace: self.namespace.clone(),
            ttl: self.ttl.filter(|secs| *secs > 0).map(Duration::from_secs),
        }
    }
}

// scheme://location?key=value&key=value
struct BackendUrl<'a> {
    scheme: &'a str,
    location: &'a str,
    params: Vec<(&'a str, &'a str)>,
}

impl<'a> BackendUrl<'a> {
    fn parse(url: &'a str) -> Result<Self, ConfigError> {
        let Some((scheme, rest)) = url.split_once("://").filter(|(s, _)| !s.is_empty()) else {
            return Err(ConfigError::MissingScheme(url.to_string()));
        };
        let (location, query) = rest.split_once('?').unwrap_or((rest, ""));
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .collect();

        Ok(Self {
            scheme,
            location,
            params,
        })
    }

    fn param(&self, name: &str) -> Option<&'a str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }
}

// Unparseable values fall back to 0.
fn parse_seconds(value: &str) -> u64 {
    value.parse().unwrap_or_else(|_| {
        warn!(value, "ignoring invalid timeout parameter");
        0
    })
}

/// Load a TOML config file and build a [`Db`] from it.
pub fn open(path: impl AsRef<Path>) -> Result<Db, InternalError> {
    Config::from_file(path)?.build()
}
