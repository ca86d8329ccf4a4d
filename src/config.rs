//! Application-level configuration loading: storage backend and game settings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

#[cfg(feature = "couch-store")]
use crate::dao::document_store::couchdb::CouchConfig;

/// Default location on disk where the client looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "AURORA_GAMES_CONFIG_PATH";
/// How long a mismatched memory pair stays face-up.
const DEFAULT_MISMATCH_REVEAL: Duration = Duration::from_millis(1_000);
const DEFAULT_FACES: [&str; 8] = ["A", "B", "C", "D", "E", "F", "G", "H"];

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Document store backing the sessions.
    pub store: StoreBackend,
    /// Rule engine settings.
    pub game: GameSettings,
}

/// Which document store backs the shared sessions.
#[derive(Debug, Clone, Default)]
pub enum StoreBackend {
    /// In-process store, sessions only shared within this process.
    #[default]
    Memory,
    /// Shared CouchDB database.
    #[cfg(feature = "couch-store")]
    CouchDb(CouchConfig),
}

/// Tunables of the rule engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    /// Distinct memory-match faces; each is dealt twice.
    pub memory_faces: Vec<String>,
    /// Delay before a mismatched pair is turned back down.
    pub mismatch_reveal: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            memory_faces: DEFAULT_FACES.map(String::from).to_vec(),
            mismatch_reveal: DEFAULT_MISMATCH_REVEAL,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        faces = config.game.memory_faces.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };
        config.with_env_store()
    }

    /// Parse the JSON configuration file contents.
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// CouchDB environment variables take over when no backend was configured.
    #[cfg(feature = "couch-store")]
    fn with_env_store(mut self) -> Self {
        if matches!(self.store, StoreBackend::Memory) {
            if let Ok(couch) = CouchConfig::from_env() {
                info!(database = %couch.database, "using CouchDB from environment");
                self.store = StoreBackend::CouchDb(couch);
            }
        }
        self
    }

    #[cfg(not(feature = "couch-store"))]
    fn with_env_store(self) -> Self {
        self
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    store: Option<RawStore>,
    #[serde(default)]
    mismatch_reveal_ms: Option<u64>,
    #[serde(default)]
    memory_faces: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
enum RawStore {
    Memory,
    #[cfg(feature = "couch-store")]
    CouchDb(CouchConfig),
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let store = match value.store {
            None | Some(RawStore::Memory) => StoreBackend::Memory,
            #[cfg(feature = "couch-store")]
            Some(RawStore::CouchDb(couch)) => StoreBackend::CouchDb(couch),
        };

        let defaults = GameSettings::default();
        let memory_faces = value
            .memory_faces
            .map(distinct_faces)
            .filter(|faces| !faces.is_empty())
            .unwrap_or(defaults.memory_faces);
        let mismatch_reveal = value
            .mismatch_reveal_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.mismatch_reveal);

        Self {
            store,
            game: GameSettings {
                memory_faces,
                mismatch_reveal,
            },
        }
    }
}

/// Keep the first occurrence of each non-blank face.
fn distinct_faces(faces: Vec<String>) -> Vec<String> {
    let mut distinct: Vec<String> = Vec::with_capacity(faces.len());
    for face in faces {
        let face = face.trim().to_string();
        if !face.is_empty() && !distinct.contains(&face) {
            distinct.push(face);
        }
    }
    distinct
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
