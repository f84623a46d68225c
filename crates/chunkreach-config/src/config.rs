//! Streaming limits and per-server profiles, persisted as RON.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted configuration inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Streaming limits.
    pub stream: StreamConfig,
    /// Auxiliary server profiles keyed by game server address.
    pub servers: HashMap<String, ServerProfile>,
    /// Logging.
    pub debug: DebugConfig,
}

/// Limits on how many extra chunks are loaded and how fast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Extra chunks per second the auxiliary server may push.
    pub chunk_loads_per_second: u32,
    /// Cap on chunks loaded in the client world.
    pub max_chunks_loaded: usize,
}

/// Auxiliary server settings for one game server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerProfile {
    /// Address of the auxiliary chunk server, `host` or `host:port`.
    pub chunk_server_address: String,
    /// Render distance, in chunks, the game server provides itself.
    pub server_render_distance: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// `EnvFilter` directives, e.g. `"info,chunkreach_net=debug"`.
    pub log_level: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_loads_per_second: 4,
            max_chunks_loaded: 1000,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Profile for the game server at `game_address`, matched exactly.
    pub fn server_profile(&self, game_address: &str) -> Option<&ServerProfile> {
        self.servers.get(game_address)
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", path.display());
            return Ok(config);
        }
        let config = Self::read(&path)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write `config.ron` into `config_dir`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        let write_err = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let text = ron::ser::to_string_pretty(self, pretty)?;

        std::fs::create_dir_all(config_dir).map_err(write_err)?;
        std::fs::write(&path, text).map_err(write_err)
    }

    /// Re-read `config.ron`. `Some` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &fresh == self {
            return Ok(None);
        }
        log::info!("Config reloaded with changes");
        Ok(Some(fresh))
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_profile() -> Config {
        let mut config = Config::default();
        config.servers.insert(
            "play.example.net".to_string(),
            ServerProfile {
                chunk_server_address: "chunks.example.net:25580".to_string(),
                server_render_distance: 6,
            },
        );
        config
    }

    #[test]
    fn test_defaults_written_to_ron() {
        let text = ron::ser::to_string_pretty(&Config::default(), Default::default()).unwrap();
        assert!(text.contains("chunk_loads_per_second: 4"));
        assert!(text.contains("max_chunks_loaded: 1000"));
        assert!(text.contains("log_level: \"info\""));
    }

    #[test]
    fn test_profiles_survive_ron() {
        let config = with_profile();
        let parsed: Config = ron::from_str(&ron::to_string(&config).unwrap()).unwrap();
        assert_eq!(parsed.server_profile("play.example.net"), config.server_profile("play.example.net"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = ron::from_str("(stream: (chunk_loads_per_second: 9))").unwrap();
        assert_eq!(config.stream.chunk_loads_per_second, 9);
        assert_eq!(config.stream.max_chunks_loaded, 1000);
        assert_eq!(config.debug, DebugConfig::default());
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_profile_without_render_distance() {
        let config: Config =
            ron::from_str(r#"(servers: {"mc.local": (chunk_server_address: "10.0.0.2")})"#).unwrap();
        let profile = config.server_profile("mc.local").unwrap();
        assert_eq!(profile.chunk_server_address, "10.0.0.2");
        assert_eq!(profile.server_render_distance, 0);
    }

    #[test]
    fn test_unknown_keys_tolerated() {
        let text = "(stream: (max_chunks_loaded: 50, compression: true), legacy_mode: true)";
        let config: Config = ron::from_str(text).unwrap();
        assert_eq!(config.stream.max_chunks_loaded, 50);
    }

    #[test]
    fn test_server_profile_lookup_is_exact() {
        let config = with_profile();
        let profile = config.server_profile("play.example.net").unwrap();
        assert_eq!(profile.chunk_server_address, "chunks.example.net:25580");
        assert_eq!(profile.server_render_distance, 6);
        assert!(config.server_profile("PLAY.example.net").is_none());
        assert!(config.server_profile("play.example.net:25565").is_none());
    }

    #[test]
    fn test_hand_written_file_with_comments() {
        let text = r#"
            // Limits
            (
                stream: (max_chunks_loaded: 2500),
                servers: {
                    // Survival server
                    "mc.local": (chunk_server_address: "mc.local:44444", server_render_distance: 8),
                },
            )
        "#;
        let config: Config = ron::from_str(text).unwrap();
        assert_eq!(config.stream.max_chunks_loaded, 2500);
        assert_eq!(
            config.server_profile("mc.local").map(|p| p.server_render_distance),
            Some(8)
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = with_profile();
        config.stream.max_chunks_loaded = 2500;

        config.save(dir.path()).unwrap();
        assert_eq!(Config::load_or_create(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_first_load_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("chunkreach");
        assert_eq!(Config::load_or_create(&nested).unwrap(), Config::default());
        assert!(nested.join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_sees_edited_profile() {
        let dir = tempfile::tempdir().unwrap();
        let running = with_profile();
        running.save(dir.path()).unwrap();
        assert!(running.reload(dir.path()).unwrap().is_none());

        let mut edited = running.clone();
        edited.servers.get_mut("play.example.net").unwrap().server_render_distance = 10;
        edited.save(dir.path()).unwrap();

        let reloaded = running.reload(dir.path()).unwrap().unwrap();
        assert_eq!(
            reloaded.server_profile("play.example.net").unwrap().server_render_distance,
            10
        );
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not valid}}").unwrap();
        match Config::load_or_create(dir.path()) {
            Err(ConfigError::Parse { path, .. }) => assert!(path.ends_with(CONFIG_FILE)),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_reload_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::default().reload(dir.path());
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
