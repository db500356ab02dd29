//! Layered runtime settings.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. `automap.toml` in the working directory, or the file given with `--config`
//! 3. `AUTOMAP_*` environment variables, `__` between nested keys
//!    (`AUTOMAP_POLL__BATCH_WIDTH=20`, `AUTOMAP_STORE_PATH=/var/lib/automap.json`)
//!
//! List values from the environment are comma separated.
//!
//! ```toml
//! store_path = "automap.json"
//!
//! [cache]
//! ttl_secs = 300
//!
//! [poll]
//! batch_width = 10
//! node_patterns = ["dc1-"]
//!
//! [credentials]
//! community = "public"
//! ```

use std::path::{Path, PathBuf};

use automap_engine::rates::STALE_AFTER_SECS;
use automap_engine::{PlacementSettings, DEFAULT_TTL_SECS};
use automap_pollers::{Credentials, PollSettings};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "AUTOMAP";

/// Settings file read from the working directory when no path is given.
pub const DEFAULT_FILE: &str = "automap.toml";

const LIST_KEYS: [&str; 2] = ["poll.node_patterns", "poll.exclusions"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// JSON file backing the record store.
    pub store_path: PathBuf,
    pub cache: CacheSettings,
    pub placement: PlacementSettings,
    pub poll: PollSettings,
    pub credentials: CredentialSettings,
    pub fixture: FixtureSettings,
    pub gateway: GatewaySettings,
    pub export: ExportSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("automap.json"),
            cache: CacheSettings::default(),
            placement: PlacementSettings::default(),
            poll: PollSettings::default(),
            credentials: CredentialSettings::default(),
            fixture: FixtureSettings::default(),
            gateway: GatewaySettings::default(),
            export: ExportSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Seconds before every cached aggregate is recomputed.
    pub ttl_secs: u64,
    /// Seconds after which an interface snapshot no longer yields a rate.
    pub stale_after_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            stale_after_secs: STALE_AFTER_SECS,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub community: String,
    pub user: Option<String>,
    pub auth_password: Option<String>,
    pub priv_password: Option<String>,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            community: "public".to_string(),
            user: None,
            auth_password: None,
            priv_password: None,
        }
    }
}

impl std::fmt::Debug for CredentialSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.resolve(), f)
    }
}

impl CredentialSettings {
    /// User credentials when all three parts are set, community otherwise.
    pub fn resolve(&self) -> Credentials {
        Credentials::resolve(
            self.user.as_deref(),
            self.auth_password.as_deref(),
            self.priv_password.as_deref(),
            &self.community,
        )
    }
}

/// Recorded device answers, for labs without live devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureSettings {
    pub path: Option<PathBuf>,
}

/// HTTP polling gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

/// Periodic graph export while running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub graph_path: PathBuf,
    pub interval_secs: u64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            graph_path: PathBuf::from("graph.json"),
            interval_secs: 60,
        }
    }
}

impl Settings {
    /// Load from defaults, the settings file and the process environment.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, Environment::with_prefix(ENV_PREFIX))
    }

    /// Like [`Settings::load`] with a caller-provided environment source.
    pub fn load_with(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path),
            None => File::new(DEFAULT_FILE, FileFormat::Toml).required(false),
        };

        let env = LIST_KEYS.iter().fold(
            env.prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
            |env, key| env.with_list_parse_key(key),
        );

        Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()
    }
}
