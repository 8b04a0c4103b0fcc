//! Application-level configuration loading: keep-alive cadence, storage selection and board seeds.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::board::{Board, BoardCredentials};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "DART_LIVE_CONFIG_PATH";
/// Interval of the shared SSE keep-alive.
const DEFAULT_KEEPALIVE_SECS: u64 = 25;
/// Board slots read from `BOARD_<i>_*` variables.
const MAX_SEEDED_BOARDS: usize = 8;

/// Board registered at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSeed {
    pub id: String,
    pub name: String,
    pub credentials: BoardCredentials,
}

/// MongoDB location; absent means the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoSettings {
    pub uri: String,
    pub database: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub keep_alive: Duration,
    pub mongo: Option<MongoSettings>,
    pub boards: Vec<BoardSeed>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            mongo: None,
            boards: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load the configuration file, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_file();
        config.apply_env(|key| env::var(key).ok());
        config
    }

    fn from_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        boards = app_config.boards.len(),
                        "loaded config file"
                    );
                    app_config
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
        }
    }

    /// Override fields from environment-style lookups.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(raw) = lookup("KEEPALIVE_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.keep_alive = Duration::from_secs(secs),
                _ => warn!(value = %raw, "ignoring invalid KEEPALIVE_SECS"),
            }
        }

        if let Some(uri) = lookup("MONGO_URI") {
            self.mongo = Some(MongoSettings {
                uri,
                database: lookup("MONGO_DB"),
            });
        }

        for index in 1..=MAX_SEEDED_BOARDS {
            let name = lookup(&format!("BOARD_{index}_NAME"));
            let serial = lookup(&format!("BOARD_{index}_SERIAL"));
            let token = lookup(&format!("BOARD_{index}_TOKEN"));
            if name.is_none() && serial.is_none() && token.is_none() {
                continue;
            }

            let id = format!("board-{index}");
            let seed = BoardSeed {
                name: name.unwrap_or_else(|| format!("Board {index}")),
                credentials: BoardCredentials::from_parts(serial, token),
                id,
            };
            match self.boards.iter_mut().find(|existing| existing.id == seed.id) {
                Some(existing) => *existing = seed,
                None => self.boards.push(seed),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    keepalive_secs: Option<u64>,
    #[serde(default)]
    mongo_uri: Option<String>,
    #[serde(default)]
    mongo_db: Option<String>,
    #[serde(default)]
    boards: Vec<RawBoard>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single seeded board.
struct RawBoard {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            keep_alive: value
                .keepalive_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.keep_alive),
            mongo: value.mongo_uri.map(|uri| MongoSettings {
                uri,
                database: value.mongo_db,
            }),
            boards: value.boards.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<RawBoard> for BoardSeed {
    fn from(value: RawBoard) -> Self {
        Self {
            name: value.name.unwrap_or_else(|| Board::default_name(&value.id)),
            credentials: BoardCredentials::from_parts(value.serial_number, value.access_token),
            id: value.id,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_memory_store_and_25s_ping() {
        let config = AppConfig::default();
        assert_eq!(config.keep_alive, Duration::from_secs(25));
        assert!(config.mongo.is_none());
        assert!(config.boards.is_empty());
    }

    #[test]
    fn board_seeds_come_from_numbered_variables() {
        let mut config = AppConfig::default();
        config.apply_env(env_of(&[
            ("BOARD_1_NAME", "Stage"),
            ("BOARD_1_SERIAL", "SN-1"),
            ("BOARD_1_TOKEN", "secret-token"),
            ("BOARD_3_SERIAL", "SN-3"),
        ]));

        assert_eq!(config.boards.len(), 2);
        assert_eq!(config.boards[0].id, "board-1");
        assert_eq!(config.boards[0].name, "Stage");
        assert_eq!(config.boards[0].credentials.serial(), Some("SN-1"));
        assert_eq!(config.boards[1].id, "board-3");
        assert_eq!(config.boards[1].name, "Board 3");
        assert_eq!(config.boards[1].credentials, BoardCredentials::Unconfigured);
    }

    #[test]
    fn mongo_and_keepalive_overrides() {
        let mut config = AppConfig::default();
        config.apply_env(env_of(&[
            ("MONGO_URI", "mongodb://db:27017"),
            ("MONGO_DB", "darts"),
            ("KEEPALIVE_SECS", "10"),
        ]));
        assert_eq!(
            config.mongo,
            Some(MongoSettings {
                uri: "mongodb://db:27017".into(),
                database: Some("darts".into()),
            })
        );
        assert_eq!(config.keep_alive, Duration::from_secs(10));

        config.apply_env(env_of(&[("KEEPALIVE_SECS", "0")]));
        assert_eq!(config.keep_alive, Duration::from_secs(10));
    }

    #[test]
    fn file_format_is_parsed() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"keepalive_secs": 5, "boards": [{"id": "board-9", "serial_number": "S", "access_token": "T"}]}"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.keep_alive, Duration::from_secs(5));
        assert_eq!(config.boards[0].name, "Board board-9");
        assert!(matches!(
            config.boards[0].credentials,
            BoardCredentials::Configured { .. }
        ));
    }
}
